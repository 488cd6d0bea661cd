//! Integration tests for driving a single upload step by step
//!
//! Every test runs against the in-memory [`ScriptedTransport`] with a 64
//! byte chunk size, so a payload of `n * CHUNK` bytes has exactly `n` chunks.

mod common;

use chunked_uploader::chunker::{Chunker, MerkleChunker};
use chunked_uploader::transport::{ChunkRejection, TransportError, TransportErrorKind};
use chunked_uploader::types::{b64_decode, b64_encode, ChunkSubmission, TransactionHeader};
use chunked_uploader::upload::{UploadConfig, UploadProgress, Uploader};
use chunked_uploader::{FixedJitter, TransportResponse, UploadError};
use common::*;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_single_chunk_is_posted_inline() {
    init_logging();
    let transport = ScriptedTransport::new();
    let data = payload(50);

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), data.clone())
        .unwrap();
    assert_eq!(upload.total_chunks(), 1);

    upload.upload_next_chunk().await.unwrap();

    let headers = transport.headers();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers[0].data, b64_encode(&data));
    assert_eq!(transport.chunk_calls(), 0);

    assert!(upload.is_complete());
    assert_eq!(upload.uploaded_chunks(), 1);
    assert_eq!(upload.percent_complete(), 100);
    assert!(upload.header().data.is_empty());
}

#[tokio::test]
async fn test_two_chunks_are_posted_separately() {
    init_logging();
    let transport = ScriptedTransport::new();
    let data = payload(2 * CHUNK);

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), data.clone())
        .unwrap();
    assert_eq!(upload.total_chunks(), 2);

    upload.upload_next_chunk().await.unwrap();
    assert!(upload.state().header_posted);
    assert_eq!(upload.uploaded_chunks(), 0);
    assert!(transport.headers()[0].data.is_empty());

    upload.upload_next_chunk().await.unwrap();
    upload.upload_next_chunk().await.unwrap();
    assert!(upload.is_complete());

    let chunks = transport.chunks();
    assert_eq!(chunks.len(), 2);
    assert_eq!(b64_decode(&chunks[0].chunk).unwrap(), &data[..CHUNK]);
    assert_eq!(b64_decode(&chunks[1].chunk).unwrap(), &data[CHUNK..]);
    assert_eq!(chunks[0].data_root, upload.header().data_root);
    assert_eq!(chunks[0].data_size, (2 * CHUNK).to_string());
}

#[tokio::test]
async fn test_run_to_completion() {
    init_logging();
    let transport = ScriptedTransport::new();

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(10 * CHUNK))
        .unwrap();

    let progress = upload.run_to_completion().await.unwrap();
    assert_eq!(progress, UploadProgress::new(10, 10));
    assert_eq!(transport.header_calls(), 1);
    assert_eq!(transport.chunk_calls(), 10);

    let offsets = transport.chunk_offsets();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_empty_payload_completes_on_header() {
    init_logging();
    let transport = ScriptedTransport::new();

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), Vec::new())
        .unwrap();
    assert_eq!(upload.total_chunks(), 0);
    assert!(!upload.is_complete());

    upload.upload_next_chunk().await.unwrap();
    assert!(upload.is_complete());
    assert_eq!(upload.percent_complete(), 0);
    assert_eq!(transport.header_calls(), 1);
    assert_eq!(transport.chunk_calls(), 0);

    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::AlreadyComplete)
    ));
    assert_eq!(transport.header_calls(), 1);
}

#[tokio::test]
async fn test_completed_upload_makes_no_requests() {
    let transport = ScriptedTransport::new();
    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(3 * CHUNK))
        .unwrap();
    upload.run_to_completion().await.unwrap();

    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::AlreadyComplete)
    ));
    assert_eq!(transport.chunk_calls(), 3);

    // a second run on a finished upload is a no-op
    upload.run_to_completion().await.unwrap();
    assert_eq!(transport.chunk_calls(), 3);
}

#[tokio::test]
async fn test_unsigned_header_is_rejected() {
    let transport = ScriptedTransport::new();
    let result = uploader(transport.clone()).begin_upload(TransactionHeader::default(), payload(10));

    assert!(matches!(result, Err(UploadError::NotSigned)));
    assert_eq!(transport.header_calls(), 0);
}

#[tokio::test]
async fn test_conflicting_data_root_is_rejected() {
    let mut header = signed_header();
    header.data_root = "c29tZXRoaW5nIGVsc2U".into();

    let result = uploader(ScriptedTransport::new()).begin_upload(header, payload(10));
    assert!(matches!(result, Err(UploadError::DataMismatch { .. })));
}

#[tokio::test]
async fn test_prepared_header_is_used_as_is() {
    let transport = ScriptedTransport::new();
    let data = payload(4 * CHUNK);

    let mut header = signed_header();
    MerkleChunker::with_chunk_sizes(CHUNK, 8)
        .unwrap()
        .prepare_manifest(&mut header, &data)
        .unwrap();
    let data_root = header.data_root.clone();

    let mut upload = uploader(transport.clone())
        .begin_upload(header, data)
        .unwrap();
    assert_eq!(upload.header().data_root, data_root);

    upload.run_to_completion().await.unwrap();
    assert_eq!(transport.chunk_calls(), 4);
}

#[tokio::test]
async fn test_fatal_rejection_stops_upload() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.push_chunk_responses(TransportResponse::ok(), 3);
    transport.push_chunk_response(TransportResponse::failed(
        400,
        ChunkRejection::InvalidProof.into(),
    ));

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(10 * CHUNK))
        .unwrap();

    let err = upload.run_to_completion().await.unwrap_err();
    match &err {
        UploadError::FatalChunkUpload {
            index,
            kind,
            message,
        } => {
            assert_eq!(*index, 3);
            assert_eq!(
                *kind,
                TransportErrorKind::Rejected(ChunkRejection::InvalidProof)
            );
            assert_eq!(message, "invalid_proof");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.is_permanent());
    assert_eq!(upload.uploaded_chunks(), 3);
    assert_eq!(upload.last_response_error(), "invalid_proof");
    assert_eq!(transport.chunk_calls(), 4);

    // the rejection sticks; nothing else is sent
    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::FatalChunkUpload { index: 3, .. })
    ));
    assert_eq!(transport.chunk_calls(), 4);
    assert!(!upload.is_complete());
}

#[tokio::test]
async fn test_every_rejection_is_fatal() {
    for rejection in ChunkRejection::ALL {
        let transport = ScriptedTransport::new();
        transport.push_chunk_response(TransportResponse::failed(
            400,
            TransportError::from_response_text(rejection.as_str()),
        ));

        let mut upload = uploader(transport.clone())
            .begin_upload(signed_header(), payload(2 * CHUNK))
            .unwrap();
        upload.upload_next_chunk().await.unwrap();

        assert!(
            matches!(
                upload.upload_next_chunk().await,
                Err(UploadError::FatalChunkUpload { index: 0, .. })
            ),
            "{} was not fatal",
            rejection
        );
    }
}

#[tokio::test]
async fn test_retryable_chunk_failure() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.push_chunk_response(TransportResponse::ok());
    transport.push_chunk_response(server_error());

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(3 * CHUNK))
        .unwrap();

    let err = upload.run_to_completion().await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::RetryableTransport { status: 500, .. }
    ));
    assert!(err.is_retryable());
    assert_eq!(upload.uploaded_chunks(), 1);
    assert_eq!(upload.last_response_status(), 500);
    assert_eq!(upload.last_response_error(), "internal error");

    upload.run_to_completion().await.unwrap();
    assert!(upload.is_complete());
    assert_eq!(upload.last_response_error(), "");
    assert_eq!(transport.chunk_calls(), 4);

    // the failed chunk was resent with the same offset
    let offsets = transport.chunk_offsets();
    assert_eq!(offsets[1], offsets[2]);
}

#[tokio::test]
async fn test_header_network_failure_is_retried() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.push_header_response(TransportResponse::failed(
        0,
        TransportError::network("connection refused"),
    ));

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();

    let err = upload.upload_next_chunk().await.unwrap_err();
    assert!(matches!(err, UploadError::RetryableTransport { status: 0, .. }));
    assert!(!upload.state().header_posted);
    assert_eq!(upload.last_response_error(), "connection refused");
    assert!(upload.state().last_request_end_millis > 0);

    upload.upload_next_chunk().await.unwrap();
    assert!(upload.state().header_posted);
    assert_eq!(upload.last_response_error(), "");
    assert_eq!(transport.header_calls(), 2);
}

#[tokio::test]
async fn test_header_rejected_without_error() {
    let transport = ScriptedTransport::new();
    transport.push_header_response(TransportResponse::new(503, "busy"));

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();

    upload.upload_next_chunk().await.unwrap();
    assert!(!upload.state().header_posted);
    assert_eq!(upload.last_response_status(), 503);
    assert_eq!(upload.last_response_error(), "");

    upload.run_to_completion().await.unwrap();
    assert_eq!(transport.header_calls(), 2);
    assert_eq!(transport.chunk_calls(), 2);
}

#[tokio::test]
async fn test_run_stops_when_header_is_not_accepted() {
    let transport = ScriptedTransport::new();
    transport.push_header_response(TransportResponse::new(503, "busy"));

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();

    assert!(matches!(
        upload.run_to_completion().await,
        Err(UploadError::RetryableTransport { status: 503, .. })
    ));
    assert_eq!(transport.chunk_calls(), 0);
}

#[tokio::test]
async fn test_abandoned_after_consecutive_errors() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.push_chunk_responses(server_error(), 200);

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();
    upload.upload_next_chunk().await.unwrap();

    let mut steps = 0;
    loop {
        steps += 1;
        assert!(steps < 500, "upload never gave up");
        match upload.upload_next_chunk().await {
            Ok(()) => continue,
            Err(UploadError::UploadAbandoned { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "internal error");
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(transport.chunk_calls(), 100);
    assert_eq!(upload.uploaded_chunks(), 0);

    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::UploadAbandoned { .. })
    ));
    assert_eq!(transport.chunk_calls(), 100);
}

#[tokio::test]
async fn test_lower_error_ceiling() {
    let transport = ScriptedTransport::new();
    transport.push_chunk_responses(server_error(), 10);

    let uploader = Uploader::new(transport.clone())
        .with_chunker(small_chunker())
        .with_config(fast_config().max_consecutive_errors(3))
        .unwrap();
    let mut upload = uploader
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();
    upload.upload_next_chunk().await.unwrap();

    let mut result = Ok(());
    for _ in 0..10 {
        result = upload.upload_next_chunk().await;
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(UploadError::UploadAbandoned { .. })));
    assert_eq!(transport.chunk_calls(), 3);
}

#[tokio::test]
async fn test_success_resets_error_count() {
    let transport = ScriptedTransport::new();
    for _ in 0..5 {
        transport.push_chunk_responses(server_error(), 2);
        transport.push_chunk_response(TransportResponse::ok());
    }

    let uploader = Uploader::new(transport.clone())
        .with_chunker(small_chunker())
        .with_config(fast_config().max_consecutive_errors(3))
        .unwrap();
    let mut upload = uploader
        .begin_upload(signed_header(), payload(5 * CHUNK))
        .unwrap();

    while !upload.is_complete() {
        upload.upload_next_chunk().await.unwrap();
    }
    assert_eq!(transport.chunk_calls(), 15);
}

struct CorruptingChunker(MerkleChunker);

impl Chunker for CorruptingChunker {
    fn prepare_manifest(
        &self,
        header: &mut TransactionHeader,
        payload: &[u8],
    ) -> chunked_uploader::Result<()> {
        self.0.prepare_manifest(header, payload)
    }

    fn chunk_at(
        &self,
        header: &TransactionHeader,
        index: usize,
        payload: &[u8],
    ) -> chunked_uploader::Result<ChunkSubmission> {
        let mut submission = self.0.chunk_at(header, index, payload)?;
        let mut path = b64_decode(&submission.data_path).unwrap();
        path[0] ^= 0xff;
        submission.data_path = b64_encode(&path);
        Ok(submission)
    }

    fn validate_inclusion(
        &self,
        data_root: &[u8],
        offset: u64,
        left_bound: u64,
        right_bound: u64,
        proof: &[u8],
    ) -> bool {
        self.0
            .validate_inclusion(data_root, offset, left_bound, right_bound, proof)
    }
}

#[tokio::test]
async fn test_invalid_proof_is_never_sent() {
    init_logging();
    let transport = ScriptedTransport::new();
    let chunker = CorruptingChunker(MerkleChunker::with_chunk_sizes(CHUNK, 8).unwrap());

    let uploader = Uploader::new(transport.clone())
        .with_chunker(Arc::new(chunker))
        .with_config(fast_config())
        .unwrap();
    let mut upload = uploader
        .begin_upload(signed_header(), payload(3 * CHUNK))
        .unwrap();
    upload.upload_next_chunk().await.unwrap();

    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::ChunkValidationFailed { index: 0, .. })
    ));
    assert_eq!(transport.chunk_calls(), 0);
    assert_eq!(upload.uploaded_chunks(), 0);
    assert!(upload.state().header_posted);
}

#[tokio::test]
async fn test_index_never_skips_or_regresses() {
    init_logging();
    let transport = ScriptedTransport::new();
    for i in 0..20 {
        if i % 3 == 1 {
            transport.push_chunk_response(server_error());
        } else {
            transport.push_chunk_response(TransportResponse::ok());
        }
    }

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(10 * CHUNK))
        .unwrap();

    let mut previous = upload.uploaded_chunks();
    while !upload.is_complete() {
        upload.upload_next_chunk().await.unwrap();
        let current = upload.uploaded_chunks();
        assert!(current == previous || current == previous + 1);
        previous = current;
    }

    let offsets = transport.chunk_offsets();
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(upload.uploaded_chunks(), 10);
}

#[tokio::test]
async fn test_progress_callback() {
    let transport = ScriptedTransport::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let uploader = Uploader::new(transport.clone())
        .with_chunker(small_chunker())
        .with_config(fast_config().on_progress(move |progress| {
            sink.lock().unwrap().push(progress);
        }))
        .unwrap();
    let mut upload = uploader
        .begin_upload(signed_header(), payload(4 * CHUNK))
        .unwrap();
    upload.run_to_completion().await.unwrap();

    let seen = seen.lock().unwrap();
    let percentages = seen.iter().map(|p| p.percentage).collect::<Vec<_>>();
    assert_eq!(percentages, vec![0, 25, 50, 75, 100]);
    assert!(seen.iter().all(|p| p.total_chunks == 4));
}

#[tokio::test]
async fn test_retry_waits_for_error_delay() {
    let transport = ScriptedTransport::new();
    transport.push_chunk_response(server_error());

    let uploader = Uploader::new(transport.clone())
        .with_chunker(small_chunker())
        .with_jitter(Arc::new(FixedJitter(0.0)))
        .with_config(UploadConfig::new().error_delay(Duration::from_millis(30)))
        .unwrap();
    let mut upload = uploader
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();
    upload.upload_next_chunk().await.unwrap();
    upload.upload_next_chunk().await.unwrap();
    assert_eq!(upload.last_response_status(), 500);

    let started = Instant::now();
    upload.upload_next_chunk().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert_eq!(upload.uploaded_chunks(), 1);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let result = Uploader::new(ScriptedTransport::new())
        .with_config(UploadConfig::new().jitter_ratio(2.0));
    assert!(matches!(result, Err(UploadError::InvalidParameter { .. })));
}

#[tokio::test]
async fn test_header_rejection_text_is_not_fatal() {
    init_logging();
    let transport = ScriptedTransport::new();
    transport.push_header_response(TransportResponse::failed(
        400,
        TransportError::from_response_text("invalid_json"),
    ));

    let mut upload = uploader(transport.clone())
        .begin_upload(signed_header(), payload(2 * CHUNK))
        .unwrap();

    assert!(matches!(
        upload.upload_next_chunk().await,
        Err(UploadError::RetryableTransport { status: 400, .. })
    ));
    assert_eq!(upload.last_response_error(), "invalid_json");

    upload.upload_next_chunk().await.unwrap();
    assert!(upload.state().header_posted);
    assert_eq!(transport.header_calls(), 2);

    upload.run_to_completion().await.unwrap();
    assert_eq!(transport.chunk_calls(), 2);
}

fn threshold_uploader(transport: Arc<ScriptedTransport>, threshold: usize) -> Uploader {
    Uploader::new(transport)
        .with_chunker(small_chunker())
        .with_config(fast_config().max_chunks_in_body(threshold))
        .unwrap()
}

#[tokio::test]
async fn test_payload_at_threshold_is_inline() {
    let transport = ScriptedTransport::new();
    let data = payload(3 * CHUNK);

    let mut upload = threshold_uploader(transport.clone(), 3)
        .begin_upload(signed_header(), data.clone())
        .unwrap();
    upload.upload_next_chunk().await.unwrap();

    assert!(upload.is_complete());
    assert_eq!(upload.uploaded_chunks(), 3);
    assert_eq!(transport.headers()[0].data, b64_encode(&data));
    assert_eq!(transport.chunk_calls(), 0);
}

#[tokio::test]
async fn test_payload_above_threshold_is_chunked() {
    let transport = ScriptedTransport::new();

    let mut upload = threshold_uploader(transport.clone(), 3)
        .begin_upload(signed_header(), payload(4 * CHUNK))
        .unwrap();
    upload.upload_next_chunk().await.unwrap();

    assert_eq!(upload.uploaded_chunks(), 0);
    assert!(transport.headers()[0].data.is_empty());

    upload.run_to_completion().await.unwrap();
    assert_eq!(transport.chunk_calls(), 4);
}
