//! End-to-end chapter downloads through the engine.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    FakeSource, Harness, MockNotifier, SOURCE_ID, chapter, drain, eventually, files_in, manga,
    next_outcome, outcomes, spawn_concurrency_probe,
};
use tanko_cache::chapter_key;
use tanko_core::{ChapterId, ChapterNotice, DownloadEvent, DownloadStatus, PageStatus, SourceId};
use tanko_download::{ChapterDestination, ChapterOutcome, DownloadError};
use tokio_test::{assert_err, assert_ok};

fn chapter_dir(h: &Harness, id: i64) -> std::path::PathBuf {
    ChapterDestination::plan(h.downloads.path(), "Fake Source", &manga(), &chapter(id)).dir
}

#[tokio::test]
async fn downloads_a_chapter_into_its_directory() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 3), 2).await;
    let mut events = h.engine.subscribe();
    let mut finished = h.engine.subscribe_finished();

    let report = assert_ok!(h.engine.enqueue(&manga(), SOURCE_ID, &[ch.clone()]).await);
    assert_eq!(report.queued, vec![ChapterId(1)]);
    assert!(h.engine.start());

    assert_eq!(next_outcome(&mut finished).await, ChapterOutcome::Downloaded { chapter_id: ChapterId(1) });
    h.engine.wait_idle().await;

    let dir = chapter_dir(&h, 1);
    assert_eq!(
        files_in(&dir),
        vec!["000-0.jpg", "001-1.jpg", "002-2.jpg", "index.json"]
    );
    assert_eq!(std::fs::read(dir.join("001-1.jpg")).unwrap(), vec![1u8; 64]);
    assert!(h.engine.queue_snapshot().is_empty());
    assert!(h.engine.is_idle());

    // The page list is cached before the images and survives the run.
    let cached = h.cache.get_page_list(&chapter_key(SOURCE_ID, &ch.url)).await.unwrap();
    assert_eq!(cached.len(), 3);

    let events = drain(&mut events);
    assert_eq!(events.first(), Some(&DownloadEvent::Queued { chapter_id: ChapterId(1) }));
    assert!(events.contains(&DownloadEvent::status(ChapterId(1), DownloadStatus::Downloading)));
    assert!(events.contains(&DownloadEvent::progress(ChapterId(1), 3, 3)));
    let done = events
        .iter()
        .position(|e| *e == DownloadEvent::status(ChapterId(1), DownloadStatus::Downloaded))
        .unwrap();
    let removed = events
        .iter()
        .position(|e| *e == DownloadEvent::Removed { chapter_id: ChapterId(1) })
        .unwrap();
    assert!(done < removed);
    assert!(events.contains(&DownloadEvent::QueueDrained));

    h.engine.stop().await;
}

#[tokio::test]
async fn pages_finish_in_page_order() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 5), 1).await;
    let mut events = h.engine.subscribe();
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    h.engine.start();
    next_outcome(&mut finished).await;

    let ready: Vec<u32> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            DownloadEvent::PageChanged {
                index,
                status: PageStatus::Ready,
                ..
            } => Some(index),
            _ => None,
        })
        .collect();
    assert_eq!(ready, vec![0, 1, 2, 3, 4]);
    h.engine.stop().await;
}

#[tokio::test]
async fn complete_chapter_is_not_downloaded_again() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 2), 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch.clone()]).await.unwrap();
    h.engine.start();
    next_outcome(&mut finished).await;
    let (lists, images) = (h.source.page_list_count(), h.source.image_count());

    let report = h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    assert_eq!(report.already_downloaded, vec![ChapterId(1)]);
    assert!(report.queued.is_empty());
    assert!(h.engine.queue_snapshot().is_empty());
    assert_eq!(h.source.page_list_count(), lists);
    assert_eq!(h.source.image_count(), images);
    h.engine.stop().await;
}

#[tokio::test]
async fn cached_images_are_reused_when_the_directory_is_lost() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 3), 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch.clone()]).await.unwrap();
    h.engine.start();
    next_outcome(&mut finished).await;
    std::fs::remove_dir_all(chapter_dir(&h, 1)).unwrap();

    let report = h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    assert_eq!(report.queued, vec![ChapterId(1)]);
    assert!(next_outcome(&mut finished).await.is_downloaded());

    assert_eq!(h.source.page_list_count(), 1);
    assert_eq!(h.source.image_count(), 3);
    assert_eq!(files_in(&chapter_dir(&h, 1)).len(), 4);
    h.engine.stop().await;
}

#[tokio::test]
async fn images_larger_than_the_cache_still_land_on_disk() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 3), 1).await;
    assert_ok!(h.cache.blobs().set_capacity(32).await);

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    let outcome = h.engine.run_one(ChapterId(1)).await;

    assert_eq!(outcome, ChapterOutcome::Downloaded { chapter_id: ChapterId(1) });
    assert_eq!(h.source.image_count(), 3);
    let dir = chapter_dir(&h, 1);
    assert_eq!(files_in(&dir).len(), 4);
    assert_eq!(std::fs::read(dir.join("002-2.jpg")).unwrap(), vec![2u8; 64]);
}

#[tokio::test]
async fn eviction_by_other_workers_does_not_fail_pages() {
    let chapters: Vec<_> = (1..=8).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 4));
    let h = Harness::new(source, 8).await;
    // Room for one 64-byte image at a time.
    assert_ok!(h.cache.blobs().set_capacity(100).await);
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    h.engine.start();
    let all = outcomes(&mut finished, 8).await;

    assert!(all.iter().all(ChapterOutcome::is_downloaded), "{all:?}");
    assert_eq!(h.source.image_count(), 32);
    for id in 1..=8 {
        assert_eq!(files_in(&chapter_dir(&h, id)).len(), 5);
    }
    assert!(h.cache.size_on_disk().await <= 100);
    h.engine.stop().await;
}

#[tokio::test]
async fn redownload_fetches_a_finished_chapter_again() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 3), 1).await;
    let mut events = h.engine.subscribe();
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch.clone()]).await.unwrap();
    h.engine.start();
    assert!(next_outcome(&mut finished).await.is_downloaded());
    assert_eq!((h.source.page_list_count(), h.source.image_count()), (1, 3));
    let dir = chapter_dir(&h, 1);
    std::fs::write(dir.join("001-1.jpg"), b"truncated").unwrap();
    drain(&mut events);

    let report = assert_ok!(h.engine.redownload(&manga(), SOURCE_ID, &[ch]).await);
    assert_eq!(report.queued, vec![ChapterId(1)]);
    assert!(report.already_downloaded.is_empty());
    assert!(next_outcome(&mut finished).await.is_downloaded());

    // Nothing was served from the chapter directory or the cache.
    assert_eq!((h.source.page_list_count(), h.source.image_count()), (2, 6));
    assert_eq!(std::fs::read(dir.join("001-1.jpg")).unwrap(), vec![1u8; 64]);
    assert_eq!(files_in(&dir).len(), 4);

    let events = drain(&mut events);
    assert_eq!(events.first(), Some(&DownloadEvent::Queued { chapter_id: ChapterId(1) }));
    assert!(events.contains(&DownloadEvent::status(ChapterId(1), DownloadStatus::Downloaded)));
    h.engine.stop().await;
}

#[tokio::test]
async fn redownload_replaces_a_failed_chapter_but_not_a_queued_one() {
    let (ch1, ch2) = (chapter(1), chapter(2));
    let source = FakeSource::new()
        .with_chapter(&ch1, 2)
        .with_chapter(&ch2, 2)
        .failing_image(&ch1, 0, u32::MAX);
    let h = Harness::new(source, 1).await;

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch1.clone(), ch2.clone()]).await.unwrap();
    assert!(!h.engine.run_one(ChapterId(1)).await.is_downloaded());
    assert_eq!(h.status_of(1), Some(DownloadStatus::Error));
    h.source.heal_image(&ch1, 0);

    let report = h.engine.redownload(&manga(), SOURCE_ID, &[ch1, ch2]).await.unwrap();
    assert_eq!(report.queued, vec![ChapterId(1)]);
    assert_eq!(report.already_queued, vec![ChapterId(2)]);
    assert_eq!(h.status_of(1), Some(DownloadStatus::Queued));

    assert!(h.engine.run_one(ChapterId(1)).await.is_downloaded());
    assert_eq!(h.source.page_list_count(), 2);
    assert_eq!(files_in(&chapter_dir(&h, 1)).len(), 3);
}

#[tokio::test]
async fn failed_page_keeps_chapter_for_retry() {
    let ch = chapter(1);
    let source = FakeSource::new()
        .with_chapter(&ch, 3)
        .failing_image(&ch, 1, u32::MAX);
    let h = Harness::new(source, 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch.clone()]).await.unwrap();
    h.engine.start();

    match next_outcome(&mut finished).await {
        ChapterOutcome::Failed { chapter_id, error } => {
            assert_eq!(chapter_id, ChapterId(1));
            assert!(error.to_string().contains("1 of 3 pages failed"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let download = h.engine.queue_snapshot().pop().unwrap();
    assert_eq!(download.status, DownloadStatus::Error);
    let statuses: Vec<_> = download.pages.unwrap().iter().map(|p| p.status).collect();
    assert_eq!(statuses, vec![PageStatus::Ready, PageStatus::Error, PageStatus::Ready]);
    assert_eq!(download.downloaded_images, 2);
    // Three attempts for the failing page, one for each of the others.
    assert_eq!(h.source.image_count(), 5);
    assert_eq!(files_in(&chapter_dir(&h, 1)).len(), 3);

    h.source.heal_image(&ch, 1);
    assert_ok!(h.engine.retry(ChapterId(1)));
    assert!(next_outcome(&mut finished).await.is_downloaded());

    // Only the missing page was fetched again.
    assert_eq!(h.source.image_count(), 6);
    assert_eq!(h.source.page_list_count(), 1);
    assert_eq!(files_in(&chapter_dir(&h, 1)).len(), 4);
    h.engine.stop().await;
}

#[tokio::test]
async fn transient_image_failures_are_retried() {
    let ch = chapter(1);
    let source = FakeSource::new().with_chapter(&ch, 2).failing_image(&ch, 0, 2);
    let h = Harness::new(source, 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    h.engine.start();

    assert!(next_outcome(&mut finished).await.is_downloaded());
    assert_eq!(h.source.image_count(), 4);
    h.engine.stop().await;
}

#[tokio::test]
async fn missing_images_are_not_retried() {
    let ch = chapter(1);
    let source = FakeSource::new().with_chapter(&ch, 3).missing_image(&ch, 2);
    let h = Harness::new(source, 1).await;

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    match h.engine.run_one(ChapterId(1)).await {
        ChapterOutcome::Failed { error, .. } => {
            assert!(error.to_string().contains("1 of 3 pages failed"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.source.image_count(), 3);
}

#[tokio::test]
async fn page_list_failure_fails_without_retry() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 2).failing_page_list(&ch), 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    h.engine.start();

    match next_outcome(&mut finished).await {
        ChapterOutcome::Failed { error, .. } => {
            assert_eq!(
                error,
                DownloadError::network_with_status("Network error: page list unavailable", 500)
            );
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(h.source.page_list_count(), 1);
    assert_eq!(h.status_of(1), Some(DownloadStatus::Error));
    h.engine.stop().await;
}

#[tokio::test]
async fn empty_page_list_is_an_error() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_empty_chapter(&ch), 1).await;

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    let outcome = h.engine.run_one(ChapterId(1)).await;

    assert_eq!(
        outcome,
        ChapterOutcome::Failed {
            chapter_id: ChapterId(1),
            error: DownloadError::empty_page_list("Chapter 1"),
        }
    );
}

#[tokio::test]
async fn lazy_image_urls_are_resolved() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_lazy_chapter(&ch, 4), 1).await;
    let mut events = h.engine.subscribe();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    assert!(h.engine.run_one(ChapterId(1)).await.is_downloaded());

    assert_eq!(h.source.image_url_calls.load(Ordering::SeqCst), 4);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        DownloadEvent::PageChanged {
            status: PageStatus::LoadingPageUrl,
            ..
        }
    )));
}

#[tokio::test]
async fn enqueue_is_idempotent() {
    let chapters: Vec<_> = (1..=3).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 1));
    let h = Harness::new(source, 0).await;

    let first = h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    let second = h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();

    assert_eq!(first.queued.len(), 3);
    assert_eq!(second.already_queued.len(), 3);
    assert!(second.queued.is_empty());
    let order: Vec<_> = h.engine.queue_snapshot().iter().map(|d| d.chapter.id).collect();
    assert_eq!(order, vec![ChapterId(1), ChapterId(2), ChapterId(3)]);
}

#[tokio::test]
async fn unknown_source_is_rejected() {
    let h = Harness::new(FakeSource::new(), 1).await;
    let err = assert_err!(h.engine.enqueue(&manga(), SourceId(99), &[chapter(1)]).await);
    assert!(err.to_string().contains("unknown source"));
}

#[tokio::test]
async fn worker_count_bounds_concurrent_chapters() {
    let chapters: Vec<_> = (1..=6).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 2))
        .with_image_delay(Duration::from_millis(20));
    let h = Harness::new(source, 2).await;
    let max = spawn_concurrency_probe(h.engine.subscribe());
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    h.engine.start();
    let all = outcomes(&mut finished, 6).await;

    assert!(all.iter().all(ChapterOutcome::is_downloaded));
    eventually(|| max.load(Ordering::SeqCst) > 0).await;
    assert!(max.load(Ordering::SeqCst) <= 2);
    h.engine.stop().await;
}

#[tokio::test]
async fn zero_workers_pause_until_raised() {
    let chapters: Vec<_> = (1..=5).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 1))
        .with_image_delay(Duration::from_millis(40));
    let h = Harness::new(source, 0).await;
    let max = spawn_concurrency_probe(h.engine.subscribe());
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    h.engine.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h
        .engine
        .queue_snapshot()
        .iter()
        .all(|d| d.status == DownloadStatus::Queued));
    assert_eq!(h.source.page_list_count(), 0);
    assert_eq!(max.load(Ordering::SeqCst), 0);

    h.prefs.set_download_workers(2);
    let all = outcomes(&mut finished, 5).await;
    assert!(all.iter().all(ChapterOutcome::is_downloaded));

    eventually(|| max.load(Ordering::SeqCst) >= 2).await;
    assert_eq!(max.load(Ordering::SeqCst), 2);
    h.engine.stop().await;
}

#[tokio::test]
async fn raising_workers_mid_run_takes_effect() {
    let chapters: Vec<_> = (1..=6).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 2))
        .with_image_delay(Duration::from_millis(30));
    let h = Harness::new(source, 1).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    h.engine.start();
    next_outcome(&mut finished).await;

    h.prefs.set_download_workers(3);
    let engine = h.engine.clone();
    eventually(|| {
        engine
            .queue_snapshot()
            .iter()
            .filter(|d| d.status == DownloadStatus::Downloading)
            .count()
            > 1
    })
    .await;

    outcomes(&mut finished, 5).await;
    h.engine.stop().await;
}

#[tokio::test]
async fn stop_fails_in_flight_and_keeps_queued() {
    let chapters: Vec<_> = (1..=3).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 2))
        .with_image_delay(Duration::from_millis(500));
    let h = Harness::new(source, 1).await;
    let mut events = h.engine.subscribe();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    h.engine.start();
    let engine = h.engine.clone();
    eventually(|| engine.queue_snapshot()[0].status == DownloadStatus::Downloading).await;

    h.engine.stop().await;
    assert!(!h.engine.is_running());

    let snapshot = h.engine.queue_snapshot();
    assert_eq!(snapshot[0].status, DownloadStatus::Error);
    assert_eq!(snapshot[0].error.as_deref(), Some("Download stopped"));
    assert_eq!(snapshot[1].status, DownloadStatus::Queued);
    assert_eq!(snapshot[2].status, DownloadStatus::Queued);
    assert!(drain(&mut events).contains(&DownloadEvent::EngineStopped { error: None }));
    assert_eq!(h.engine.scheduler_error(), None);
}

#[tokio::test]
async fn restart_resumes_queued_chapters() {
    let chapters: Vec<_> = (1..=2).map(chapter).collect();
    let source = chapters
        .iter()
        .fold(FakeSource::new(), |s, ch| s.with_chapter(ch, 1));
    let h = Harness::new(source, 0).await;
    let mut finished = h.engine.subscribe_finished();

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    assert!(h.engine.start());
    assert!(!h.engine.start());
    h.engine.stop().await;

    h.prefs.set_download_workers(1);
    assert!(h.engine.start());
    let mut ids: Vec<_> = outcomes(&mut finished, 2)
        .await
        .iter()
        .map(ChapterOutcome::chapter_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec![ChapterId(1), ChapterId(2)]);
    h.engine.stop().await;
}

#[tokio::test]
async fn remove_and_clear() {
    let chapters: Vec<_> = (1..=3).map(chapter).collect();
    let h = Harness::new(FakeSource::new(), 0).await;

    h.engine.enqueue(&manga(), SOURCE_ID, &chapters).await.unwrap();
    assert_ok!(h.engine.remove(ChapterId(2)));
    assert!(matches!(
        h.engine.remove(ChapterId(2)),
        Err(DownloadError::NotInQueue { .. })
    ));
    assert_eq!(h.engine.clear_queue(), 2);
    assert!(h.engine.is_idle());
}

#[tokio::test]
async fn retry_requires_failed_chapter() {
    let h = Harness::new(FakeSource::new(), 0).await;
    h.engine.enqueue(&manga(), SOURCE_ID, &[chapter(1)]).await.unwrap();
    assert!(matches!(
        h.engine.retry(ChapterId(1)),
        Err(DownloadError::InvalidTransition { .. })
    ));
    assert!(matches!(
        h.engine.retry(ChapterId(5)),
        Err(DownloadError::NotInQueue { .. })
    ));
}

#[tokio::test]
async fn subscribers_see_the_same_events() {
    let ch = chapter(1);
    let h = Harness::new(FakeSource::new().with_chapter(&ch, 2), 1).await;
    let mut a = h.engine.subscribe();
    let mut b = h.engine.subscribe();

    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    h.engine.run_one(ChapterId(1)).await;

    let (a, b) = (drain(&mut a), drain(&mut b));
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[tokio::test]
async fn notifier_gets_one_notice_per_milestone() {
    let ch = chapter(1);
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|id, notice| *id == ChapterId(1) && *notice == ChapterNotice::Queued)
        .times(1)
        .return_const(());
    notifier
        .expect_notify()
        .withf(|_, notice| *notice == ChapterNotice::Downloading)
        .times(1)
        .return_const(());
    notifier
        .expect_notify()
        .withf(|_, notice| *notice == ChapterNotice::Done)
        .times(1)
        .return_const(());

    let h = Harness::with_notifier(FakeSource::new().with_chapter(&ch, 2), 1, Arc::new(notifier)).await;
    h.engine.enqueue(&manga(), SOURCE_ID, &[ch]).await.unwrap();
    assert!(h.engine.run_one(ChapterId(1)).await.is_downloaded());
}
