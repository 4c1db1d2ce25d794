//! Integration tests: upload and download tasks run through the manager

mod common;

use c189_api::CloudApi;
use c189_core::TaskKind;
use c189_tasks::{CmdInfo, DownloadTask, FileCount, Lifecycle, TaskManager, TransferTask, UploadTask};
use c189_transfer::select_uploader;
use common::{wait_idle, MemDrive, ROOT};
use std::sync::Arc;
use tempfile::TempDir;

fn no_restart(_: usize, _: &CmdInfo) -> bool {
    false
}

fn upload_task(drive: &Arc<MemDrive>) -> UploadTask {
    let api: Arc<dyn CloudApi> = drive.clone();
    UploadTask::new(api.clone(), select_uploader(api, false))
}

#[tokio::test]
async fn directory_upload_counts_files_and_finishes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("album");
    std::fs::create_dir_all(root.join("raw")).unwrap();
    std::fs::write(root.join("cover.jpg"), b"jpeg").unwrap();
    std::fs::write(root.join("raw/1.cr2"), vec![7u8; 4096]).unwrap();

    let drive = MemDrive::new();
    let mut task = upload_task(&drive);
    task.set_upload_path(&root, false, false, true);
    task.set_target(ROOT, "/");
    let task = Arc::new(task);

    let manager = TaskManager::new();
    manager.submit(task.clone(), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Finished, "{:?}", snap.errors);
    assert_eq!(snap.count, Some(FileCount { done: 2, total: 2 }));
    assert!(snap.summary.contains("(2/2) -> /"), "{}", snap.summary);
    assert!(snap.errors.is_empty());

    let album = drive
        .children(ROOT)
        .into_iter()
        .find(|e| e.name == "album")
        .unwrap();
    let raw = drive
        .children(&album.id)
        .into_iter()
        .find(|e| e.name == "raw")
        .unwrap();
    assert_eq!(drive.children(&raw.id)[0].name, "1.cr2");
}

#[tokio::test]
async fn failed_files_land_in_error_list() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("docs");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("a.txt"), b"a").unwrap();
    std::fs::write(root.join("sub/b.txt"), b"b").unwrap();

    let drive = MemDrive::new();
    drive.fail_upload("b.txt");
    let mut task = upload_task(&drive);
    task.set_upload_path(&root, false, false, true);
    task.set_target(ROOT, "/");

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Error);
    assert_eq!(snap.errors.len(), 1);
    assert!(snap.errors[0].contains("b.txt"), "{}", snap.errors[0]);
    assert!(snap.errors[0].contains("network error"));
    // The sibling still went through
    assert_eq!(snap.count, Some(FileCount { done: 2, total: 2 }));

    let mut out = Vec::new();
    manager.show_detail(0, &mut out, false).await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Error Messages:\n"));
}

#[tokio::test]
async fn missing_upload_path_is_an_error_not_a_finish() {
    let tmp = TempDir::new().unwrap();
    let drive = MemDrive::new();
    let mut task = upload_task(&drive);
    task.set_upload_path(tmp.path().join("gone.bin"), true, false, true);

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Error);
    assert!(snap.errors[0].starts_with("file upload failed: local path missing"));
}

#[tokio::test]
async fn directory_task_on_a_plain_file_is_a_folder_error() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("not-a-dir.txt");
    std::fs::write(&file, b"x").unwrap();

    let drive = MemDrive::new();
    let mut task = upload_task(&drive);
    task.set_upload_path(&file, false, false, true);

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Error);
    assert_eq!(snap.count, None);
    assert!(
        snap.errors[0].starts_with("folder upload failed: local path missing"),
        "{}",
        snap.errors[0]
    );
    assert!(drive.children(ROOT).is_empty());
}

#[tokio::test]
async fn empty_directory_still_finishes() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("empty");
    std::fs::create_dir(&root).unwrap();

    let drive = MemDrive::new();
    let mut task = upload_task(&drive);
    task.set_upload_path(&root, false, false, true);

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Finished);
    assert!(snap.progress.is_complete());
}

#[tokio::test]
async fn download_task_writes_file_and_finishes() {
    let tmp = TempDir::new().unwrap();
    let drive = MemDrive::new();
    let fid = drive.add_file(ROOT, "paper.pdf", &[1u8; 10_000]);

    let mut task = DownloadTask::new(drive.clone(), tmp.path());
    task.set_fid(&fid, true, "/papers", "paper.pdf");
    assert_eq!(task.summary(), "Download: /papers/paper.pdf");

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Finished);
    assert_eq!(snap.progress.done, 10_000);
    assert_eq!(std::fs::read(tmp.path().join("paper.pdf")).unwrap().len(), 10_000);
}

#[tokio::test]
async fn download_of_unknown_id_records_reason() {
    let tmp = TempDir::new().unwrap();
    let drive = MemDrive::new();
    let mut task = DownloadTask::new(drive.clone(), tmp.path());
    task.set_fid("31337", true, "", "");

    let manager = TaskManager::new();
    manager.submit(Arc::new(task), &no_restart).await;
    wait_idle(&manager).await;

    let snap = manager.snapshot(0).await.unwrap();
    assert_eq!(snap.lifecycle, Lifecycle::Error);
    assert_eq!(
        snap.errors,
        vec!["file download failed: unknown failure -> 31337 (id 31337)"]
    );
}

#[tokio::test]
async fn equivalent_paths_share_a_dedup_key() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("music");
    std::fs::create_dir(&dir).unwrap();
    let drive = MemDrive::new();

    let mut plain = upload_task(&drive);
    plain.set_upload_path(&dir, false, false, true);
    plain.set_target("55", "/backup");
    let mut dotted = upload_task(&drive);
    dotted.set_upload_path(dir.join("../music/."), false, true, false);
    dotted.set_target("55", "/backup");
    assert_eq!(plain.cmd_info(), dotted.cmd_info());
    assert_eq!(plain.cmd_info().kind, TaskKind::Upload);

    let mut elsewhere = upload_task(&drive);
    elsewhere.set_upload_path(&dir, false, false, true);
    elsewhere.set_target("56", "/other");
    assert_ne!(plain.cmd_info(), elsewhere.cmd_info());

    let mut a = DownloadTask::new(drive.clone(), tmp.path().join("dl"));
    a.set_fid("9", true, "", "x");
    let mut b = DownloadTask::new(drive.clone(), tmp.path().join("dl/./"));
    b.set_fid("9", true, "/elsewhere", "x");
    assert_eq!(a.cmd_info(), b.cmd_info());
}
