//! Upload Inspector CLI
//!
//! A command-line tool for looking at chunk manifests and saved upload state.

use bytesize::ByteSize;
use chunked_uploader::chunker::{Chunker, MerkleChunker, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use chunked_uploader::types::{b64_decode, TransactionHeader};
use chunked_uploader::upload::{PersistedUpload, UploadProgress, MAX_CHUNKS_IN_BODY};
use chunked_uploader::TransportError;
use clap::{Arg, ArgMatches, Command};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("upload_inspect")
        .version("0.1.0")
        .about("Chunked upload inspector")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("max-chunk-size")
                .long("max-chunk-size")
                .help("Largest chunk in bytes")
                .value_parser(clap::value_parser!(usize))
                .default_value("262144")
                .global(true),
        )
        .arg(
            Arg::new("min-chunk-size")
                .long("min-chunk-size")
                .help("Smallest trailing chunk in bytes")
                .value_parser(clap::value_parser!(usize))
                .default_value("32768")
                .global(true),
        )
        .subcommand(
            Command::new("manifest")
                .about("Compute the data root and chunk layout of a file")
                .arg(Arg::new("file").help("Payload file").required(true)),
        )
        .subcommand(
            Command::new("state")
                .about("Summarize a saved upload")
                .arg(Arg::new("state").help("Saved upload JSON").required(true)),
        )
        .subcommand(
            Command::new("verify")
                .about("Check that a file can resume a saved upload")
                .arg(Arg::new("state").help("Saved upload JSON").required(true))
                .arg(Arg::new("file").help("Payload file").required(true)),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let chunker = chunker_from(&matches)?;

    match matches.subcommand() {
        Some(("manifest", sub_matches)) => {
            let payload = fs::read(required(sub_matches, "file")?)?;
            let mut header = TransactionHeader::default();
            chunker.prepare_manifest(&mut header, &payload)?;

            println!("Data size: {}", ByteSize::b(payload.len() as u64));
            println!("Data root: {}", display_root(&header.data_root));
            println!("Chunks: {}", header.chunk_count());
            println!("Posted inline: {}", header.chunk_count() <= MAX_CHUNKS_IN_BODY);

            if verbose {
                if let Some(manifest) = header.chunks.as_ref() {
                    for (i, chunk) in manifest.chunks.iter().enumerate() {
                        println!(
                            "  {}. {}..{} ({})",
                            i + 1,
                            chunk.min_byte_range,
                            chunk.max_byte_range,
                            ByteSize::b(chunk.len())
                        );
                    }
                }
            }
        }
        Some(("state", sub_matches)) => {
            let persisted = PersistedUpload::load(required(sub_matches, "state")?)?;
            let header = &persisted.transaction_header;

            println!("Transaction: {}", header.id);
            println!("Data root: {}", display_root(&header.data_root));
            println!("Data size: {} bytes", header.data_size);
            println!("Header posted: {}", persisted.header_posted);
            println!("Next chunk: {}", persisted.chunk_index);
            println!("Last status: {}", persisted.last_response_status);

            if !persisted.last_response_error_text.is_empty() {
                let err = TransportError::from_response_text(
                    persisted.last_response_error_text.as_str(),
                );
                println!(
                    "Last error: {} ({})",
                    err.message,
                    if persisted.header_posted && err.is_fatal() {
                        "fatal"
                    } else {
                        "retryable"
                    }
                );
            }
        }
        Some(("verify", sub_matches)) => {
            let persisted = PersistedUpload::load(required(sub_matches, "state")?)?;
            let payload = fs::read(required(sub_matches, "file")?)?;

            let mut header = persisted.transaction_header.without_data();
            chunker.prepare_manifest(&mut header, &payload)?;

            if header.data_root != persisted.transaction_header.data_root {
                return Err(format!(
                    "Data root mismatch: saved {}, file {}",
                    display_root(&persisted.transaction_header.data_root),
                    display_root(&header.data_root)
                )
                .into());
            }

            let total = header.chunk_count();
            if persisted.chunk_index > total {
                return Err(format!(
                    "Saved chunk index {} exceeds {} chunks",
                    persisted.chunk_index, total
                )
                .into());
            }

            let data_root = b64_decode(&header.data_root)?;
            for index in persisted.chunk_index..total {
                let submission = chunker.chunk_at(&header, index, &payload)?;
                let valid = chunker.validate_inclusion(
                    &data_root,
                    submission.offset.parse()?,
                    0,
                    submission.data_size.parse()?,
                    &b64_decode(&submission.data_path)?,
                );
                if !valid {
                    return Err(format!("Chunk {} failed proof validation", index).into());
                }
                if verbose {
                    println!("  chunk {} ok", index);
                }
            }

            let progress = UploadProgress::new(persisted.chunk_index, total);
            println!(
                "File matches; {} of {} chunks uploaded ({}%)",
                progress.uploaded_chunks, progress.total_chunks, progress.percentage
            );
        }
        _ => {
            println!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

fn chunker_from(matches: &ArgMatches) -> Result<MerkleChunker, Box<dyn std::error::Error>> {
    let max = matches
        .get_one::<usize>("max-chunk-size")
        .copied()
        .unwrap_or(MAX_CHUNK_SIZE);
    let min = matches
        .get_one::<usize>("min-chunk-size")
        .copied()
        .unwrap_or(MIN_CHUNK_SIZE);
    Ok(MerkleChunker::with_chunk_sizes(max, min)?)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String, String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| format!("Missing argument: {}", name))
}

fn display_root(root: &str) -> &str {
    if root.is_empty() {
        "(empty)"
    } else {
        root
    }
}
