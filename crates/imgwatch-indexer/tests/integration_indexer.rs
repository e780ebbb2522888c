//! Integration tests for the imgwatch watch pipeline.
//!
//! These drive a real directory through `ImageService` and wait for the
//! index to converge on what is on disk.

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

use image::{ImageFormat, Rgb, RgbImage};
use imgwatch_indexer::{ImageEntry, ImageService, WatcherOptions};

/// How long to wait for a change to reach the index
const CONVERGE_TIMEOUT: Duration = Duration::from_secs(10);

fn fast_options() -> WatcherOptions {
    WatcherOptions {
        debounce_duration: Duration::from_millis(50),
        ..Default::default()
    }
}

fn write_image(dir: &Path, name: &str, width: u32, height: u32) {
    RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
        .save(dir.join(name))
        .unwrap();
}

/// Poll `files()` until `check` holds or the timeout expires.
async fn wait_for<F>(service: &ImageService, check: F) -> Vec<ImageEntry>
where
    F: Fn(&[ImageEntry]) -> bool,
{
    let deadline = tokio::time::Instant::now() + CONVERGE_TIMEOUT;
    loop {
        let files = service.files();
        if check(&files) || tokio::time::Instant::now() >= deadline {
            return files;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

fn summary(files: &[ImageEntry]) -> Vec<(&str, u32, u32)> {
    files
        .iter()
        .map(|f| (f.name.as_str(), f.width, f.height))
        .collect()
}

/// Directory with an image and a text file, then delete + create
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_then_create_scenario() {
    let temp_dir = tempdir().unwrap();
    write_image(temp_dir.path(), "a.png", 10, 20);
    std::fs::write(temp_dir.path().join("notes.txt"), "not an image").unwrap();

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    assert_eq!(summary(&service.files()), vec![("a.png", 10, 20)]);

    std::fs::remove_file(temp_dir.path().join("a.png")).unwrap();
    write_image(temp_dir.path(), "b.jpg", 5, 5);

    let files = wait_for(&service, |f| summary(f) == vec![("b.jpg", 5, 5)]).await;
    assert_eq!(summary(&files), vec![("b.jpg", 5, 5)]);

    service.stop().await;
}

/// Every valid image present at watch time is indexed
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initial_scan_counts_images() {
    let temp_dir = tempdir().unwrap();
    for i in 0..12 {
        write_image(temp_dir.path(), &format!("img_{:02}.png", i), i + 1, i + 2);
    }

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    assert_eq!(service.files().len(), 12);
    let first = service.get("img_00.png").unwrap();
    assert_eq!((first.width, first.height), (1, 2));
    assert!(first.location.is_absolute());

    service.stop().await;
}

/// Re-creating a name replaces the entry instead of duplicating it
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recreate_replaces_entry() {
    let temp_dir = tempdir().unwrap();
    write_image(temp_dir.path(), "same.png", 4, 4);

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    std::fs::remove_file(temp_dir.path().join("same.png")).unwrap();
    write_image(temp_dir.path(), "same.png", 8, 3);

    let files = wait_for(&service, |f| summary(f) == vec![("same.png", 8, 3)]).await;
    assert_eq!(summary(&files), vec![("same.png", 8, 3)]);

    service.stop().await;
}

/// A file moved into the directory is indexed, moved out is dropped
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_in_and_out() {
    let outside = tempdir().unwrap();
    let watched = tempdir().unwrap();
    write_image(outside.path(), "incoming.png", 6, 7);
    write_image(watched.path(), "leaving.png", 2, 2);

    let service = ImageService::default();
    service.watch(watched.path(), &fast_options()).await.unwrap();

    std::fs::rename(
        outside.path().join("incoming.png"),
        watched.path().join("incoming.png"),
    )
    .unwrap();
    std::fs::rename(
        watched.path().join("leaving.png"),
        outside.path().join("leaving.png"),
    )
    .unwrap();

    let files = wait_for(&service, |f| summary(f) == vec![("incoming.png", 6, 7)]).await;
    assert_eq!(summary(&files), vec![("incoming.png", 6, 7)]);

    service.stop().await;
}

/// Rename within the directory moves the entry to the new name
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_within_directory() {
    let temp_dir = tempdir().unwrap();
    write_image(temp_dir.path(), "before.png", 3, 9);

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    std::fs::rename(
        temp_dir.path().join("before.png"),
        temp_dir.path().join("after.png"),
    )
    .unwrap();

    let files = wait_for(&service, |f| summary(f) == vec![("after.png", 3, 9)]).await;
    assert_eq!(summary(&files), vec![("after.png", 3, 9)]);

    service.stop().await;
}

/// Non-image files created after watch never show up
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_created_non_image_never_indexed() {
    let temp_dir = tempdir().unwrap();

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    std::fs::write(temp_dir.path().join("readme.md"), "# hi").unwrap();
    write_image(temp_dir.path(), "marker.png", 1, 1);

    // Once the later image shows up, the earlier event has been processed.
    let files = wait_for(&service, |f| f.iter().any(|e| e.name == "marker.png")).await;
    assert_eq!(summary(&files), vec![("marker.png", 1, 1)]);

    service.stop().await;
}

/// Readers running alongside the reconciler always see whole entries
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_during_changes() {
    let temp_dir = tempdir().unwrap();
    let service = Arc::new(ImageService::default());
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    for entry in service.files() {
                        // Each fixture is square with side = index + 1.
                        assert_eq!(entry.width, entry.height);
                        assert_eq!(entry.location.file_name().unwrap(), entry.name.as_str());
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for i in 0..20u32 {
        write_image(temp_dir.path(), &format!("sq_{}.png", i), i + 1, i + 1);
        if i % 2 == 0 {
            std::fs::remove_file(temp_dir.path().join(format!("sq_{}.png", i))).unwrap();
        }
    }

    for reader in readers {
        reader.await.unwrap();
    }

    let files = wait_for(&service, |f| f.len() == 10).await;
    assert_eq!(files.len(), 10);
    assert!(files.iter().all(|f| f.width == f.height));

    service.stop().await;
}

/// A writer that opens the file long before the header lands is still indexed
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_writer_is_indexed() {
    let temp_dir = tempdir().unwrap();
    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();

    let mut bytes = Vec::new();
    RgbImage::from_pixel(7, 3, Rgb([1, 2, 3]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();

    let path = temp_dir.path().join("slow.png");
    let mut file = File::create(&path).unwrap();
    // Well past the debounce window, so the create is seen while empty
    tokio::time::sleep(Duration::from_millis(400)).await;
    file.write_all(&bytes).unwrap();
    drop(file);

    let files = wait_for(&service, |f| summary(f) == vec![("slow.png", 7, 3)]).await;
    assert_eq!(summary(&files), vec![("slow.png", 7, 3)]);

    service.stop().await;
}

/// Images created while `watch` is still listing the directory are not lost
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_images_created_during_watch_are_indexed() {
    let temp_dir = tempdir().unwrap();
    for i in 0..300 {
        write_image(temp_dir.path(), &format!("base_{:03}.png", i), 16, 16);
    }

    let dir = temp_dir.path().to_path_buf();
    let writer = std::thread::spawn(move || {
        for i in 0..10 {
            write_image(&dir, &format!("late_{}.png", i), 2, 3);
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let service = ImageService::default();
    service.watch(temp_dir.path(), &fast_options()).await.unwrap();
    writer.join().unwrap();

    let files = wait_for(&service, |f| f.len() == 310).await;
    assert_eq!(files.len(), 310);
    for i in 0..10 {
        let late = service.get(&format!("late_{}.png", i)).unwrap();
        assert_eq!((late.width, late.height), (2, 3));
    }

    service.stop().await;
}
