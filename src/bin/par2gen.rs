//! par2gen binary - create PAR2 recovery sets
//!
//! Writes `<base>.par2` holding the critical packets and, when recovery
//! slices are requested, `<base>.vol000+NN.par2` holding the recovery packets
//! followed by another copy of the critical packets.

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use log::debug;
use par2gen::{
    CharEncoding, FileInfo, Gf16Engine, Par2, Par2File, Par2Options, CREATOR, RECOVERY_HEADER_SIZE,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(false)
        .init();

    let matches = Command::new("par2gen")
        .version(env!("CARGO_PKG_VERSION"))
        .about("PAR2 recovery set creator")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("create")
                .visible_alias("c")
                .about("Create PAR2 recovery files")
                .arg(
                    Arg::new("par2_file")
                        .help("Base name for PAR2 files")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("files")
                        .help("Files to protect")
                        .required(true)
                        .num_args(1..)
                        .index(2),
                )
                .arg(
                    Arg::new("slice_size")
                        .short('s')
                        .long("slice-size")
                        .help("Slice size in bytes (multiple of 4)")
                        .value_name("BYTES")
                        .default_value("1048576"),
                )
                .arg(
                    Arg::new("recovery_count")
                        .short('c')
                        .long("recovery-count")
                        .help("Number of recovery slices")
                        .value_name("COUNT")
                        .default_value("5"),
                )
                .arg(
                    Arg::new("chunk_size")
                        .long("chunk-size")
                        .help("Compute recovery data in chunks of this many bytes")
                        .value_name("BYTES"),
                )
                .arg(
                    Arg::new("comment")
                        .long("comment")
                        .help("Comment to store in the recovery set")
                        .value_name("TEXT"),
                )
                .arg(
                    Arg::new("batch")
                        .long("batch")
                        .help("Input slices per coding pass (default: 16)")
                        .value_name("N"),
                )
                .arg(
                    Arg::new("encoding")
                        .long("encoding")
                        .help("Text packets for names and comments: auto, both, ascii, unicode")
                        .value_name("MODE")
                        .default_value("auto"),
                )
                .arg(
                    Arg::new("threads")
                        .short('t')
                        .long("threads")
                        .help("Number of CPU threads for computation (0 = auto-detect)")
                        .value_name("N")
                        .default_value("0"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .help("Quiet mode - minimal output")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("create", sub_matches)) => handle_create(sub_matches),
        _ => {
            eprintln!("Error: No command specified");
            eprintln!("\nUse 'par2gen --help' for usage information");
            std::process::exit(1);
        }
    }
}

/// Settings for one `create` run
struct CreateJob {
    base: String,
    inputs: Vec<PathBuf>,
    slice_size: u64,
    recovery_count: u16,
    chunk_size: Option<usize>,
    comment: Option<String>,
    encoding: CharEncoding,
    options: Par2Options,
    quiet: bool,
}

impl CreateJob {
    fn from_args(matches: &clap::ArgMatches) -> Result<Self> {
        let base = matches
            .get_one::<String>("par2_file")
            .context("par2_file is required")?
            .trim_end_matches(".par2")
            .to_string();
        let inputs = matches
            .get_many::<String>("files")
            .context("files are required")?
            .map(PathBuf::from)
            .collect();

        let slice_size = parse_arg(matches, "slice_size")?.unwrap_or(1_048_576);
        let recovery_count = parse_arg(matches, "recovery_count")?.unwrap_or(0);
        let chunk_size: Option<usize> = parse_arg(matches, "chunk_size")?;
        if let Some(size) = chunk_size {
            if size == 0 || size % 2 != 0 {
                bail!("Chunk size must be a non-zero multiple of 2 (got {})", size);
            }
        }
        let encoding = matches
            .get_one::<String>("encoding")
            .map(|s| s.parse::<CharEncoding>())
            .transpose()?
            .unwrap_or_default();

        let threads: usize = parse_arg(matches, "threads")?.unwrap_or(0);
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .context("Failed to configure thread pool")?;
        }

        Ok(Self {
            base,
            inputs,
            slice_size,
            recovery_count,
            chunk_size,
            comment: matches.get_one::<String>("comment").cloned(),
            encoding,
            options: Par2Options::from_args(matches),
            quiet: matches.get_flag("quiet"),
        })
    }

    fn index_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.par2", self.base))
    }

    fn volume_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.vol000+{:02}.par2", self.base, self.recovery_count))
    }
}

fn parse_arg<T>(matches: &clap::ArgMatches, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .get_one::<String>(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("Invalid value for --{}: {}", name.replace('_', "-"), value))
        })
        .transpose()
}

fn handle_create(matches: &clap::ArgMatches) -> Result<()> {
    let job = CreateJob::from_args(matches)?;

    let mut paths = HashMap::new();
    let mut infos = Vec::with_capacity(job.inputs.len());
    for path in &job.inputs {
        let info = FileInfo::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        anyhow::ensure!(
            paths.insert(info.name.clone(), path.clone()).is_none(),
            "Duplicate file name: {}",
            info.name
        );
        infos.push(info);
    }

    let mut par2 = Par2::with_options(
        infos,
        job.slice_size,
        Gf16Engine::new(job.options.alignment),
        job.options.clone(),
    )?;
    if !job.quiet {
        println!(
            "Creating recovery set {} ({} input slices of {} bytes)",
            par2.set_id(),
            par2.total_slices(),
            par2.slice_size()
        );
    }

    let chunked = job.chunk_size.filter(|_| job.recovery_count > 0);
    if chunked.is_none() {
        par2.set_recovery_count(job.recovery_count);
    }

    let mut files = par2.take_files()?;
    for file in files.iter_mut() {
        let path = &paths[file.name()];
        stream_file(file, path, &mut par2)
            .with_context(|| format!("Failed to process {}", path.display()))?;
        if !job.quiet {
            println!("Processed {} ({} slices)", file.name(), file.num_slices());
        }
    }
    par2.finalise()?;

    let critical = critical_packets(&job, &mut par2, &mut files)?;
    let index_path = job.index_path();
    std::fs::write(&index_path, &critical)
        .with_context(|| format!("Failed to write {}", index_path.display()))?;

    if job.recovery_count > 0 {
        let volume_path = job.volume_path();
        match chunked {
            Some(chunk_size) => {
                write_volume_chunked(&job, &volume_path, chunk_size, &par2, &mut files, &paths, &critical)?
            }
            None => write_volume(&job, &volume_path, &mut par2, &critical)?,
        }
        if !job.quiet {
            println!(
                "Wrote {} recovery slices to {}",
                job.recovery_count,
                volume_path.display()
            );
        }
    }

    if !job.quiet {
        println!("Done.");
    }
    Ok(())
}

/// Feed every slice of one input file through the recovery set
fn stream_file(file: &mut Par2File, path: &Path, par2: &mut Par2) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut buffer = vec![0u8; par2.slice_size() as usize];
    for pos in 0..file.num_slices() {
        let len = file.slice_len(pos);
        reader.read_exact(&mut buffer[..len])?;
        file.process(&buffer[..len], par2)?;
    }
    Ok(())
}

/// Main, per-file, Creator and Comment packets in one buffer
fn critical_packets(job: &CreateJob, par2: &mut Par2, files: &mut [Par2File]) -> Result<Vec<u8>> {
    let mut packets = par2.packet_main()?.to_vec();
    for file in files.iter_mut() {
        packets.extend(file.make_packet_description(job.encoding)?);
        packets.extend(file.packet_checksums()?);
    }
    packets.extend(par2.make_packet_creator(CREATOR)?);
    if let Some(comment) = &job.comment {
        packets.extend(par2.make_packet_comment(comment, job.encoding)?);
    }
    Ok(packets)
}

fn write_volume(
    job: &CreateJob,
    path: &Path,
    par2: &mut Par2,
    critical: &[u8],
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for index in 0..job.recovery_count as usize {
        let packet = par2.take_packet_recovery(index)?;
        writer.write_all(&packet)?;
    }
    writer.write_all(critical)?;
    writer.flush()?;
    Ok(())
}

/// Compute the recovery slices one chunk window at a time
///
/// Every pass re-reads the window from each input slice and writes the chunk
/// of every recovery slice straight to its place in the volume file.
fn write_volume_chunked(
    job: &CreateJob,
    path: &Path,
    chunk_size: usize,
    par2: &Par2,
    files: &mut [Par2File],
    paths: &HashMap<String, PathBuf>,
    critical: &[u8],
) -> Result<()> {
    let exponents: Vec<u16> = (0..job.recovery_count).collect();
    let mut chunker = par2.start_chunking(&exponents, true)?;
    let slice_size = par2.slice_size();
    let packet_size = par2.recovery_size(1);

    let mut volume = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut readers = files
        .iter()
        .map(|file| Ok(BufReader::new(File::open(&paths[file.name()])?)))
        .collect::<Result<Vec<_>>>()?;
    let mut buffer = vec![0u8; chunk_size];

    let mut offset = 0u64;
    while offset < slice_size {
        let len = (chunk_size as u64).min(slice_size - offset) as usize;
        if len != chunker.chunk_size() {
            chunker.set_chunk_size(len)?;
        }
        debug!("Chunk pass at offset {} ({} bytes)", offset, len);

        for (file, reader) in files.iter_mut().zip(readers.iter_mut()) {
            for pos in 0..file.num_slices() {
                let available = (file.slice_len(pos) as u64).saturating_sub(offset);
                let take = available.min(len as u64) as usize;
                reader.seek(SeekFrom::Start(pos as u64 * slice_size + offset))?;
                reader.read_exact(&mut buffer[..take])?;
                chunker.process_file(file, &buffer[..take])?;
            }
        }
        chunker.finalise(files)?;

        for index in 0..exponents.len() {
            let position = index as u64 * packet_size + RECOVERY_HEADER_SIZE as u64 + offset;
            volume.seek(SeekFrom::Start(position))?;
            volume.write_all(chunker.recovery_data(index)?)?;
        }
        offset += len as u64;
    }

    for index in 0..exponents.len() {
        volume.seek(SeekFrom::Start(index as u64 * packet_size))?;
        volume.write_all(&chunker.take_header(index)?)?;
    }
    volume.seek(SeekFrom::Start(exponents.len() as u64 * packet_size))?;
    volume.write_all(critical)?;
    volume.flush()?;
    Ok(())
}
