//! End-to-end scenarios S1-S6 from spec section 8, exercised against the
//! in-memory fakes under `upload_migrate::client::fake`.
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt as _;
use tokio_util::sync::CancellationToken;

use upload_migrate::cid::{PartCid, SpaceId, UploadCid};
use upload_migrate::client::fake::{
    FakeDestinationClient, FakePartFetcher, FakeRegisterPart, FakeRegisterUpload, FakeSource,
};
use upload_migrate::config::MigrationConfig;
use upload_migrate::model::{Outcome, Upload};
use upload_migrate::receipt::Authorization;

fn space() -> SpaceId {
    SpaceId::new("did:key:z6MkTestSpace")
}

fn concurrency(n: usize) -> MigrationConfig {
    MigrationConfig::new().with_concurrency(std::num::NonZeroUsize::new(n).unwrap())
}

/// S1: happy path, single upload, single part, destination already holds
/// it. One success, zero byte transfers.
#[tokio::test(flavor = "multi_thread")]
async fn s1_single_upload_single_part_done() {
    let part = PartCid::new("bagP1");
    let upload = Upload::new("bafyU1", vec![part.clone()]);
    let source = FakeSource::new(vec![upload]);
    let bodies = HashMap::from([(part.clone(), bytes::Bytes::from_static(b"hello"))]);
    let fetcher = FakePartFetcher::new(bodies);
    let destination = FakeDestinationClient::new(); // default: "done" + register-upload Ok

    let outcomes: Vec<Outcome> = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(4),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_success());
    let Outcome::Success(success) = &outcomes[0] else {
        panic!("expected success");
    };
    assert_eq!(success.parts.len(), 1);
    assert!(success.parts[&part].copy_response_status.is_none());
}

/// S2: two parts, destination demands bytes for one. Exactly one PUT with
/// a 2xx response.
#[tokio::test(flavor = "multi_thread")]
async fn s2_two_parts_one_needs_copy() {
    let part_done = PartCid::new("bagDone");
    let part_upload = PartCid::new("bagUpload");
    let upload = Upload::new("bafyU2", vec![part_done.clone(), part_upload.clone()]);
    let source = FakeSource::new(vec![upload]);
    let bodies = HashMap::from([
        (part_done.clone(), bytes::Bytes::from(vec![0u8; 100])),
        (part_upload.clone(), bytes::Bytes::from(vec![1u8; 100])),
    ]);
    let fetcher = FakePartFetcher::new(bodies);
    let destination = FakeDestinationClient::new().with_register_part(
        part_upload.clone(),
        FakeRegisterPart::Upload {
            url: "https://destination.test/upload-url".to_string(),
        },
    );

    let outcomes: Vec<Outcome> = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(4),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(outcomes.len(), 1);
    let Outcome::Success(success) = &outcomes[0] else {
        panic!("expected success, got {:?}", outcomes[0]);
    };
    assert_eq!(success.parts[&part_upload].copy_response_status, Some(201));
    assert!(success.parts[&part_done].copy_response_status.is_none());
}

/// S3: first upload's register-part invocation fails; the other two
/// uploads succeed. Exactly one failure among three outcomes.
#[tokio::test(flavor = "multi_thread")]
async fn s3_one_bad_part_isolates_one_upload() {
    let bad_part = PartCid::new("bagBad");
    let uploads = vec![
        Upload::new("bafyA", vec![bad_part.clone()]),
        Upload::new("bafyB", vec![PartCid::new("bagB")]),
        Upload::new("bafyC", vec![PartCid::new("bagC")]),
    ];
    let source = FakeSource::new(uploads);
    let bodies = HashMap::from([
        (bad_part.clone(), bytes::Bytes::from_static(b"x")),
        (PartCid::new("bagB"), bytes::Bytes::from_static(b"y")),
        (PartCid::new("bagC"), bytes::Bytes::from_static(b"z")),
    ]);
    let fetcher = FakePartFetcher::new(bodies);
    let destination = FakeDestinationClient::new().with_register_part(
        bad_part,
        FakeRegisterPart::Err(serde_json::json!({"reason": "quota exceeded"})),
    );

    let outcomes: Vec<Outcome> = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(4),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(outcomes.len(), 3);
    let failures = outcomes.iter().filter(|o| !o.is_success()).count();
    let successes = outcomes.iter().filter(|o| o.is_success()).count();
    assert_eq!(failures, 1);
    assert_eq!(successes, 2);
    let failed = outcomes.iter().find(|o| !o.is_success()).unwrap();
    assert_eq!(failed.upload().cid, UploadCid::new("bafyA"));
}

/// S4: register-part succeeds for all three uploads, but register-upload
/// fails for the second. Expect `[Success, Failure(Bind), Success]` in
/// some order, with each success binding all of its parts.
#[tokio::test(flavor = "multi_thread")]
async fn s4_bind_failure_isolates_one_upload() {
    let uploads = vec![
        Upload::new("bafy1", vec![PartCid::new("bag1")]),
        Upload::new("bafy2", vec![PartCid::new("bag2")]),
        Upload::new("bafy3", vec![PartCid::new("bag3")]),
    ];
    let source = FakeSource::new(uploads);
    let bodies = HashMap::from([
        (PartCid::new("bag1"), bytes::Bytes::from_static(b"1")),
        (PartCid::new("bag2"), bytes::Bytes::from_static(b"2")),
        (PartCid::new("bag3"), bytes::Bytes::from_static(b"3")),
    ]);
    let fetcher = FakePartFetcher::new(bodies);
    let destination = FakeDestinationClient::new().with_register_upload(
        UploadCid::new("bafy2"),
        FakeRegisterUpload::Err(serde_json::json!({"reason": "root mismatch"})),
    );

    let outcomes: Vec<Outcome> = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(4),
        CancellationToken::new(),
    )
    .collect()
    .await;

    assert_eq!(outcomes.len(), 3);
    let by_cid: HashMap<UploadCid, &Outcome> =
        outcomes.iter().map(|o| (o.upload().cid.clone(), o)).collect();
    assert!(by_cid[&UploadCid::new("bafy1")].is_success());
    assert!(by_cid[&UploadCid::new("bafy3")].is_success());
    let Outcome::Failure(failure) = by_cid[&UploadCid::new("bafy2")] else {
        panic!("expected bafy2 to fail via Bind");
    };
    assert_eq!(failure.cause.error().kind(), upload_migrate::error::ErrorKind::Bind);
    // Both successes still bound every one of their parts.
    for cid in ["bafy1", "bafy3"] {
        let Outcome::Success(success) = by_cid[&UploadCid::new(cid)] else {
            panic!("{cid} should be a success");
        };
        assert_eq!(success.parts.len(), 1);
    }
}

/// S5: concurrency bound. With `k=3` and a part fetcher that never
/// resolves, at most 3 fetches are ever in flight, and the source is never
/// pulled more than `k+2` uploads ahead (the spec's looser "<=5" bound for
/// k=3, accounting for the stage-to-stage buffer of 1 on top of the
/// worker-pool look-ahead of 1).
#[tokio::test(flavor = "multi_thread")]
async fn s5_concurrency_bound_is_respected() {
    let uploads: Vec<Upload> = (0..10)
        .map(|i| Upload::new(format!("bafy{i}"), vec![PartCid::new(format!("bag{i}"))]))
        .collect();
    let source = FakeSource::new(uploads);
    let pulled = source.pulled_counter();
    let fetcher = FakePartFetcher::new(HashMap::new()); // every fetch hangs
    let in_flight = fetcher.in_flight_counter();
    let destination = FakeDestinationClient::new();
    let cancel = CancellationToken::new();

    let outcomes = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(3),
        cancel.clone(),
    );
    futures::pin_mut!(outcomes);

    tokio::select! {
        _ = outcomes.next() => panic!("no upload can complete; all fetches hang"),
        _ = tokio::time::sleep(Duration::from_millis(150)) => {}
    }

    assert!(
        in_flight.load(Ordering::SeqCst) <= 3,
        "in-flight fetches exceeded k=3: {}",
        in_flight.load(Ordering::SeqCst)
    );
    assert!(
        pulled.load(Ordering::SeqCst) <= 5,
        "source was pulled ahead further than the look-ahead bound: {}",
        pulled.load(Ordering::SeqCst)
    );

    cancel.cancel();
}

/// S6: cancellation mid-flight drains the pipeline cleanly, with no
/// success outcomes for uploads whose parts were still in flight, and no
/// panic escaping to the caller.
#[tokio::test(flavor = "multi_thread")]
async fn s6_cancellation_drains_cleanly() {
    let uploads: Vec<Upload> = (0..5)
        .map(|i| Upload::new(format!("bafy{i}"), vec![PartCid::new(format!("bag{i}"))]))
        .collect();
    let source = FakeSource::new(uploads);
    let fetcher = FakePartFetcher::new(HashMap::new()); // every fetch hangs until cancelled
    let destination = FakeDestinationClient::new();
    let cancel = CancellationToken::new();

    let outcomes = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(3),
        cancel.clone(),
    );

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let outcomes = tokio::time::timeout(Duration::from_secs(5), outcomes.collect::<Vec<_>>())
        .await
        .expect("pipeline should drain promptly after cancellation");
    cancel_task.await.unwrap();

    assert_eq!(outcomes.len(), 5);
    assert!(
        outcomes.iter().all(|o| !o.is_success()),
        "no upload whose part was still in flight when cancelled should succeed"
    );
}

/// S6b: cancellation aborts calls that are already in flight at the
/// register-part, byte-copy, and register-upload suspension points, not
/// just the fetch step. Each of the three uploads below hangs at a
/// different one of those points; all three must come back as
/// `Cancelled` failures once the token fires (spec §5).
#[tokio::test(flavor = "multi_thread")]
async fn s6b_cancellation_aborts_in_flight_register_put_and_bind() {
    let hang_register_part = PartCid::new("bagHangRegister");
    let hang_put = PartCid::new("bagHangPut");
    let hang_bind_part = PartCid::new("bagHangBind");
    let put_url = "https://destination.test/hang-put-url".to_string();

    let uploads = vec![
        Upload::new("bafyHangRegister", vec![hang_register_part.clone()]),
        Upload::new("bafyHangPut", vec![hang_put.clone()]),
        Upload::new("bafyHangBind", vec![hang_bind_part.clone()]),
    ];
    let source = FakeSource::new(uploads);
    let bodies = HashMap::from([
        (hang_register_part.clone(), bytes::Bytes::from_static(b"a")),
        (hang_put.clone(), bytes::Bytes::from_static(b"b")),
        (hang_bind_part.clone(), bytes::Bytes::from_static(b"c")),
    ]);
    let fetcher = FakePartFetcher::new(bodies);
    let destination = FakeDestinationClient::new()
        .with_register_part(hang_register_part, FakeRegisterPart::Hang)
        .with_register_part(
            hang_put,
            FakeRegisterPart::Upload {
                url: put_url.clone(),
            },
        )
        .with_put_hang(put_url)
        .with_register_upload(UploadCid::new("bafyHangBind"), FakeRegisterUpload::Hang);
    let cancel = CancellationToken::new();

    let outcomes = upload_migrate::migrate(
        source,
        fetcher,
        destination,
        Authorization::default(),
        space(),
        concurrency(4),
        cancel.clone(),
    );

    let cancel_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let outcomes = tokio::time::timeout(Duration::from_secs(5), outcomes.collect::<Vec<_>>())
        .await
        .expect("pipeline should drain promptly once cancellation aborts in-flight calls");
    cancel_task.await.unwrap();

    assert_eq!(outcomes.len(), 3);
    let by_cid: HashMap<UploadCid, &Outcome> =
        outcomes.iter().map(|o| (o.upload().cid.clone(), o)).collect();

    // Register-part and byte-copy hangs fail at the part level; the
    // upload-level cause aggregates as `SomePartsFailed`.
    for (cid, part) in [
        ("bafyHangRegister", PartCid::new("bagHangRegister")),
        ("bafyHangPut", PartCid::new("bagHangPut")),
    ] {
        let Outcome::Failure(failure) = by_cid[&UploadCid::new(cid)] else {
            panic!("{cid} should fail once cancelled mid-flight");
        };
        assert_eq!(
            failure.cause.error().kind(),
            upload_migrate::error::ErrorKind::SomePartsFailed
        );
        let upload_migrate::model::PartOutcome::Failure(part_failure) = &failure.parts[&part]
        else {
            panic!("{cid}'s part should have failed");
        };
        assert_eq!(
            part_failure.cause.error().kind(),
            upload_migrate::error::ErrorKind::Cancelled
        );
    }

    // A register-upload (bind) hang fails directly with `Cancelled` at the
    // upload level, with its part already marked a success.
    let Outcome::Failure(bind_failure) = by_cid[&UploadCid::new("bafyHangBind")] else {
        panic!("bafyHangBind should fail once cancelled mid-flight");
    };
    assert_eq!(
        bind_failure.cause.error().kind(),
        upload_migrate::error::ErrorKind::Cancelled
    );
}
