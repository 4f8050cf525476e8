use super::*;
use crate::errors::RestoreError;
use std::fs;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("restore-core-archive-{prefix}-{nanos}"))
}

/// Records calls and fails extraction on demand.
struct FakeBackend {
    label: &'static str,
    fail_extract: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    fn new(label: &'static str, fail_extract: bool) -> Arc<Self> {
        Arc::new(Self {
            label,
            fail_extract,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ArchiveBackend for FakeBackend {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn extract(&self, archive: &Path, _dest: &Path) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("extract {}", archive.display()));
        if self.fail_extract {
            return Err(RestoreError::Archive {
                tool: self.label,
                message: "simulated failure".into(),
            });
        }
        Ok(())
    }

    async fn compress(&self, src_dir: &Path, _dest_file: &Path) -> Result<()> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("compress {}", src_dir.display()));
        Ok(())
    }
}

#[test]
fn dispatch_table_by_extension() {
    let zip = CompressionMethod::Zip;
    assert_eq!(
        extraction_plan(Path::new("backup.7z"), &zip),
        ExtractionPlan::only(Backend::ExternalTool)
    );
    assert_eq!(
        extraction_plan(Path::new("backup.ZIP"), &CompressionMethod::Tar),
        ExtractionPlan::only(Backend::ExternalTool)
    );
    let tar_plan = ExtractionPlan {
        primary: Backend::BuiltinTarGz,
        fallback: Some(Backend::ExternalTool),
    };
    assert_eq!(extraction_plan(Path::new("backup.tar.gz"), &zip), tar_plan);
    assert_eq!(extraction_plan(Path::new("/srv/b/Backup.TGZ"), &zip), tar_plan);
}

#[test]
fn unknown_extension_follows_configured_method() {
    let rar = Path::new("backup.rar");
    assert_eq!(
        extraction_plan(rar, &CompressionMethod::Tar).primary,
        Backend::BuiltinTarGz
    );
    assert_eq!(
        extraction_plan(rar, &CompressionMethod::SevenZip).primary,
        Backend::ExternalTool
    );
    assert_eq!(
        extraction_plan(rar, &CompressionMethod::Other("lz4".into())),
        ExtractionPlan::only(Backend::ExternalTool)
    );
}

#[test]
fn compression_follows_method_only() {
    assert_eq!(compression_backend(&CompressionMethod::Tar), Backend::BuiltinTarGz);
    assert_eq!(compression_backend(&CompressionMethod::Zip), Backend::ExternalTool);
    assert_eq!(compression_backend(&CompressionMethod::SevenZip), Backend::ExternalTool);
    assert_eq!(
        compression_backend(&CompressionMethod::Other("rar".into())),
        Backend::ExternalTool
    );
}

#[tokio::test]
async fn tar_failure_retries_with_external_tool_once() {
    let external = FakeBackend::new("7z", false);
    let builtin = FakeBackend::new("tar", true);
    let engine = ArchiveEngine::new(external.clone(), builtin.clone(), CompressionMethod::Zip);

    engine
        .extract(Path::new("world.tar.gz"), Path::new("out"))
        .await
        .expect("fallback should succeed");

    assert_eq!(builtin.calls(), vec!["extract world.tar.gz"]);
    assert_eq!(external.calls(), vec!["extract world.tar.gz"]);
}

#[tokio::test]
async fn external_failure_has_no_fallback() {
    let external = FakeBackend::new("7z", true);
    let builtin = FakeBackend::new("tar", false);
    let engine = ArchiveEngine::new(external.clone(), builtin.clone(), CompressionMethod::Tar);

    let err = engine
        .extract(Path::new("world.7z"), Path::new("out"))
        .await
        .expect_err("7z failure is final");
    assert!(err.to_string().contains("simulated failure"));
    assert!(builtin.calls().is_empty());
    assert_eq!(external.calls().len(), 1);
}

#[tokio::test]
async fn compress_uses_configured_backend() {
    let external = FakeBackend::new("7z", false);
    let builtin = FakeBackend::new("tar", false);
    let engine = ArchiveEngine::new(external.clone(), builtin.clone(), CompressionMethod::Tar);

    engine
        .compress(Path::new("scratch/world"), Path::new("backup/x.tar.gz"))
        .await
        .expect("compress");
    assert_eq!(builtin.calls(), vec!["compress scratch/world"]);
    assert!(external.calls().is_empty());
}

#[test]
fn seven_zip_arguments() {
    let args = SevenZip::extract_args(Path::new("in.7z"), Path::new("tmp/World"));
    assert_eq!(args, vec!["x", "in.7z", "-otmp/World", "-y"]);

    let args = SevenZip::compress_args(Path::new("scratch"), Path::new("backup/a.7z"));
    assert_eq!(args[0], "a");
    assert_eq!(args[1], "backup/a.7z");
    assert_eq!(PathBuf::from(&args[2]), Path::new("scratch").join("*"));
    assert_eq!(args[3], "-y");
}

#[test]
fn configured_seven_zip_resolves_against_server_dir() {
    let server = unique_temp_dir("bedrock");
    let paths = restore_utils::ServerPaths::new(&server);
    let config = PluginConfig::default();

    let tool = SevenZip::configured(&config.exe_7z_path, &paths);
    assert_eq!(
        tool.program(),
        server.join("./plugins/EasyBackuper/7za.exe").as_path()
    );
    assert!(tool.program().is_absolute());

    let absolute = server.join("tools").join("7za.exe");
    let tool = SevenZip::configured(&absolute, &paths);
    assert_eq!(tool.program(), absolute.as_path());
}

#[tokio::test]
async fn missing_seven_zip_binary_is_an_archive_error() {
    let backend = SevenZip::new("/nonexistent/bin/7z-definitely-missing");
    let err = backend
        .extract(Path::new("missing.7z"), Path::new("out"))
        .await
        .expect_err("spawn must fail");
    assert!(matches!(err, RestoreError::Archive { tool: "7z", .. }));
}

#[test]
fn contained_path_rejects_escapes() {
    let dest = Path::new("/tmp/out");
    assert_eq!(
        contained_path(dest, Path::new("./World/db/CURRENT")),
        Some(PathBuf::from("/tmp/out/World/db/CURRENT"))
    );
    assert_eq!(contained_path(dest, Path::new("../evil")), None);
    assert_eq!(contained_path(dest, Path::new("World/../../evil")), None);
    assert_eq!(contained_path(dest, Path::new("/etc/passwd")), None);
}

fn seed(root: &Path) {
    fs::create_dir_all(root.join("db")).expect("create db");
    fs::create_dir_all(root.join("behavior_packs")).expect("create empty dir");
    fs::write(root.join("level.dat"), b"level").expect("write level.dat");
    fs::write(root.join("db").join("000005.ldb"), vec![7u8; 64 * 1024]).expect("write ldb");
}

#[tokio::test]
async fn targz_round_trip_is_rooted_at_source_name() {
    let base = unique_temp_dir("roundtrip");
    let world = base.join("MyWorld");
    seed(&world);

    let archive = base.join("out").join("MyWorld.tar.gz");
    TarGz.compress(&world, &archive).await.expect("compress");

    let dest = base.join("extracted");
    TarGz.extract(&archive, &dest).await.expect("extract");

    assert_eq!(fs::read(dest.join("MyWorld").join("level.dat")).expect("read"), b"level");
    assert_eq!(
        fs::read(dest.join("MyWorld").join("db").join("000005.ldb"))
            .expect("read ldb")
            .len(),
        64 * 1024
    );
    assert!(dest.join("MyWorld").join("behavior_packs").is_dir());

    let _ = fs::remove_dir_all(base);
}

#[cfg(unix)]
#[tokio::test]
async fn targz_restores_mode_bits() {
    use std::os::unix::fs::PermissionsExt;

    let base = unique_temp_dir("mode");
    let world = base.join("W");
    fs::create_dir_all(&world).expect("create world");
    let file = world.join("start.sh");
    fs::write(&file, b"#!/bin/sh\n").expect("write");
    fs::set_permissions(&file, fs::Permissions::from_mode(0o751)).expect("chmod");

    let archive = base.join("w.tgz");
    TarGz.compress(&world, &archive).await.expect("compress");
    TarGz.extract(&archive, &base.join("x")).await.expect("extract");

    let mode = fs::metadata(base.join("x").join("W").join("start.sh"))
        .expect("stat")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o751);
    let _ = fs::remove_dir_all(base);
}

#[tokio::test]
async fn targz_refuses_parent_dir_entries() {
    let base = unique_temp_dir("traversal");
    fs::create_dir_all(&base).expect("create base");
    let archive = base.join("evil.tar.gz");

    {
        let file = fs::File::create(&archive).expect("create archive");
        let mut builder =
            tar::Builder::new(flate2::write::GzEncoder::new(file, flate2::Compression::default()));
        let data = b"pwned";
        let mut header = tar::Header::new_old();
        let name = b"../escaped.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &data[..]).expect("append entry");
        builder
            .into_inner()
            .expect("finish tar")
            .finish()
            .expect("finish gzip");
    }

    let dest = base.join("dest");
    let err = TarGz
        .extract(&archive, &dest)
        .await
        .expect_err("traversal must be refused");
    assert!(matches!(err, RestoreError::UnsafeEntry(_)));
    assert!(!base.join("escaped.txt").exists());

    let _ = fs::remove_dir_all(base);
}

#[tokio::test]
async fn targz_rejects_non_gzip_input() {
    let base = unique_temp_dir("garbage");
    fs::create_dir_all(&base).expect("create base");
    let archive = base.join("bad.tar.gz");
    fs::write(&archive, b"this is not gzip").expect("write garbage");

    let err = TarGz
        .extract(&archive, &base.join("dest"))
        .await
        .expect_err("garbage must fail");
    assert!(matches!(err, RestoreError::Archive { tool: "tar", .. }));
    let _ = fs::remove_dir_all(base);
}

fn seven_zip_available() -> bool {
    std::process::Command::new("7z")
        .arg("i")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn seven_zip_round_trip_when_installed() {
    if !seven_zip_available() {
        return;
    }
    let base = unique_temp_dir("7z");
    let scratch = base.join("scratch");
    seed(&scratch.join("MyWorld"));

    let archive = base.join("snap.7z");
    let backend = SevenZip::new("7z");
    backend.compress(&scratch, &archive).await.expect("7z compress");

    let dest = base.join("dest");
    backend.extract(&archive, &dest).await.expect("7z extract");
    assert_eq!(fs::read(dest.join("MyWorld").join("level.dat")).expect("read"), b"level");

    let _ = fs::remove_dir_all(base);
}
