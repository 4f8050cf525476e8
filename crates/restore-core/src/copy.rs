use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{self, JoinSet};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{RestoreError, Result};

/// One file to copy. Lives only between the walk and the worker that copies it.
#[derive(Debug, Clone)]
struct CopyTask {
    src: PathBuf,
    dst: PathBuf,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub dirs: usize,
    pub files: usize,
}

/// At least one worker, never more than there are files.
fn pool_size(workers: usize, files: usize) -> usize {
    workers.max(1).min(files)
}

/// Copy the tree under `src` into `dst` using `workers` parallel workers.
///
/// All directories are created before any file is queued, so workers never race
/// on a missing parent. Every failing file is counted; the first failure is
/// returned as the error source. Nothing is rolled back on failure.
pub async fn copy_tree(src: &Path, dst: &Path, workers: usize) -> Result<CopyReport> {
    let (src_owned, dst_owned) = (src.to_path_buf(), dst.to_path_buf());
    let (dirs, tasks) =
        task::spawn_blocking(move || plan_and_create_dirs(&src_owned, &dst_owned)).await??;

    let report = CopyReport {
        dirs,
        files: tasks.len(),
    };
    if tasks.is_empty() {
        return Ok(report);
    }

    let (task_tx, task_rx) = mpsc::channel::<CopyTask>(tasks.len());
    let (err_tx, mut err_rx) = mpsc::channel::<RestoreError>(tasks.len());
    for item in tasks {
        // capacity == file count, never blocks
        let _ = task_tx.send(item).await;
    }
    drop(task_tx);

    let task_rx = Arc::new(Mutex::new(task_rx));
    let mut pool = JoinSet::new();
    for _ in 0..pool_size(workers, report.files) {
        let task_rx = task_rx.clone();
        let err_tx = err_tx.clone();
        pool.spawn(async move {
            loop {
                let next = task_rx.lock().await.recv().await;
                let Some(item) = next else { break };
                let outcome = task::spawn_blocking(move || copy_file(&item.src, &item.dst)).await;
                let failure = match outcome {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => err,
                    Err(join) => RestoreError::from(join),
                };
                let _ = err_tx.send(failure).await;
            }
        });
    }
    drop(err_tx);

    while let Some(joined) = pool.join_next().await {
        joined?;
    }

    let mut failures = Vec::new();
    while let Some(err) = err_rx.recv().await {
        failures.push(err);
    }
    let count = failures.len();
    match failures.into_iter().next() {
        None => Ok(report),
        Some(first) => Err(RestoreError::Copy {
            failures: count,
            first: Box::new(first),
        }),
    }
}

/// Walk `src`, recreate every directory under `dst`, and return the file tasks in walk order.
fn plan_and_create_dirs(src: &Path, dst: &Path) -> Result<(usize, Vec<CopyTask>)> {
    fs::create_dir_all(dst)
        .map_err(|e| RestoreError::io(format!("creating {}", dst.display()), e))?;

    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            RestoreError::io(
                format!("walking {}", src.display()),
                e.into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop detected")),
            )
        })?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        } else {
            files.push(entry.into_path());
        }
    }

    for dir in &dirs {
        let target = dst.join(relative(src, dir)?);
        if !target.exists() {
            fs::create_dir_all(&target)
                .map_err(|e| RestoreError::io(format!("creating {}", target.display()), e))?;
            debug!("created directory: {} ==> {}", dir.display(), target.display());
        }
    }

    let tasks = files
        .into_iter()
        .map(|file| {
            let dst = dst.join(relative(src, &file)?);
            Ok(CopyTask { src: file, dst })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((dirs.len(), tasks))
}

fn relative<'a>(root: &Path, path: &'a Path) -> Result<&'a Path> {
    path.strip_prefix(root).map_err(|_| {
        RestoreError::io(
            format!("computing relative path of {}", path.display()),
            io::Error::new(io::ErrorKind::InvalidInput, "path outside copy root"),
        )
    })
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    debug!("copying file: {} --> {}", src.display(), dst.display());

    let mut reader = fs::File::open(src)
        .map_err(|e| RestoreError::io(format!("opening {}", src.display()), e))?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RestoreError::io(format!("creating {}", parent.display()), e))?;
    }
    let mut writer = fs::File::create(dst)
        .map_err(|e| RestoreError::io(format!("creating {}", dst.display()), e))?;
    io::copy(&mut reader, &mut writer)
        .map_err(|e| RestoreError::io(format!("copying {}", src.display()), e))?;

    let permissions = reader
        .metadata()
        .map_err(|e| RestoreError::io(format!("reading metadata of {}", src.display()), e))?
        .permissions();
    drop(writer);
    fs::set_permissions(dst, permissions)
        .map_err(|e| RestoreError::io(format!("setting permissions on {}", dst.display()), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("restore-core-copy-{prefix}-{nanos}"))
    }

    fn seed_world(root: &Path) {
        fs::create_dir_all(root.join("db").join("lost")).expect("create db dirs");
        fs::create_dir_all(root.join("empty")).expect("create empty dir");
        fs::write(root.join("level.dat"), b"level-data").expect("write level.dat");
        fs::write(root.join("levelname.txt"), b"Bedrock level").expect("write levelname");
        for i in 0..24 {
            fs::write(root.join("db").join(format!("{i:06}.ldb")), vec![i as u8; 4096 + i])
                .expect("write ldb");
        }
        fs::write(root.join("db").join("lost").join("MANIFEST"), b"manifest").expect("write manifest");
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut out: Vec<_> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let rel = e.path().strip_prefix(root).expect("strip").to_path_buf();
                (rel, fs::read(e.path()).expect("read"))
            })
            .collect();
        out.sort();
        out
    }

    #[tokio::test]
    async fn copy_is_identical_for_any_worker_count() {
        let base = unique_temp_dir("workers");
        let src = base.join("src");
        seed_world(&src);
        let expected = snapshot(&src);

        for workers in [1, 2, 4, 16] {
            let dst = base.join(format!("dst-{workers}"));
            let report = copy_tree(&src, &dst, workers).await.expect("copy tree");
            assert_eq!(report.files, expected.len());
            assert_eq!(snapshot(&dst), expected, "workers={workers}");
            assert!(dst.join("empty").is_dir());
        }

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn pool_never_exceeds_file_count() {
        assert_eq!(pool_size(0, 10), 1);
        assert_eq!(pool_size(4, 10), 4);
        assert_eq!(pool_size(4, 3), 3);
        assert_eq!(pool_size(usize::MAX, 2), 2);
    }

    #[tokio::test]
    async fn zero_workers_is_treated_as_one() {
        let base = unique_temp_dir("zero");
        let src = base.join("src");
        seed_world(&src);
        let dst = base.join("dst");
        copy_tree(&src, &dst, 0).await.expect("copy tree");
        assert_eq!(snapshot(&dst), snapshot(&src));
        let _ = fs::remove_dir_all(base);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn permission_bits_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let base = unique_temp_dir("perm");
        let src = base.join("src");
        fs::create_dir_all(&src).expect("create src");
        let script = src.join("run.sh");
        fs::write(&script, b"#!/bin/sh\n").expect("write script");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).expect("chmod");

        let dst = base.join("dst");
        copy_tree(&src, &dst, 2).await.expect("copy tree");
        let mode = fs::metadata(dst.join("run.sh")).expect("stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
        let _ = fs::remove_dir_all(base);
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let base = unique_temp_dir("missing");
        let err = copy_tree(&base.join("nope"), &base.join("dst"), 4)
            .await
            .expect_err("missing source must fail");
        assert!(matches!(err, RestoreError::Io { .. }));
        let _ = fs::remove_dir_all(base);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_files_are_all_counted() {
        use std::os::unix::fs::PermissionsExt;

        let base = unique_temp_dir("unreadable");
        let src = base.join("src");
        fs::create_dir_all(&src).expect("create src");
        for name in ["a", "b", "c"] {
            let path = src.join(name);
            fs::write(&path, b"x").expect("write file");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).expect("chmod");
        }
        fs::write(src.join("ok"), b"fine").expect("write ok file");

        // privileged users ignore permission bits
        if fs::read(src.join("a")).is_ok() {
            let _ = fs::remove_dir_all(base);
            return;
        }

        let err = copy_tree(&src, &base.join("dst"), 2)
            .await
            .expect_err("unreadable files must fail");
        match err {
            RestoreError::Copy { failures, .. } => assert_eq!(failures, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read(base.join("dst").join("ok")).expect("read ok"), b"fine");
        let _ = fs::remove_dir_all(base);
    }
}
