//! bankfile: write synthetic runs and inspect bank files.
//!
//! Exit status is 0 on success and 1 on a usage error or any diagnostic.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bankfile::{
    synthetic, BankFileReader, BankFileWriter, ConfigMask, Diagnostic, EventRecord, GpsTime,
    Result, SyntheticRunConfig,
};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bankfile", version, about = "Write and inspect telescope bank files")]
struct Cli {
    /// More log output on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a synthetic run and finalize it.
    WriteSynthetic {
        out: PathBuf,
        /// TOML run description; missing keys use the reference run.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        packets: Option<u32>,
        #[arg(long)]
        run: Option<u32>,
        /// Comma separated telescope ids, e.g. 0,1,3.
        #[arg(long)]
        telescopes: Option<String>,
        #[arg(long)]
        no_compress: bool,
    },
    /// Print one telescope's event from every packet, in order.
    PrintEvents {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..255))]
        telescope: u8,
    },
    /// Print one telescope's event for a single event number.
    PrintEvent {
        file: PathBuf,
        #[arg(value_parser = clap::value_parser!(u8).range(0..255))]
        telescope: u8,
        event_number: u32,
    },
    /// Header and bank counts.
    Summary {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Verify the checksum and decode every packet.
    Check { file: PathBuf },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version land here too.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(diag) => {
            eprint!("{}", diag.report());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(io::stderr)
        .init();
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::WriteSynthetic {
            out,
            config,
            packets,
            run,
            telescopes,
            no_compress,
        } => {
            let mut cfg = match config {
                Some(path) => SyntheticRunConfig::load(path)?,
                None => SyntheticRunConfig::default(),
            };
            if let Some(n) = packets {
                cfg.num_packets = n;
            }
            if let Some(r) = run {
                cfg.run_number = r;
            }
            if let Some(list) = telescopes {
                let mask = ConfigMask::parse(&list)?;
                cfg.telescopes = mask.iter().map(|id| id as u8).collect();
            }
            if no_compress {
                cfg.compress = false;
            }
            cfg.validate()?;
            write_synthetic(&out, &cfg)
        }
        Command::PrintEvents { file, telescope } => print_events(&file, telescope),
        Command::PrintEvent {
            file,
            telescope,
            event_number,
        } => print_event(&file, telescope, event_number),
        Command::Summary { file, json } => summary(&file, json),
        Command::Check { file } => check(&file),
    }
}

fn write_synthetic(out: &Path, cfg: &SyntheticRunConfig) -> Result<ExitCode> {
    let mut writer = BankFileWriter::create(out, cfg.run_number, &cfg.config_mask())?;
    for index in 0..cfg.num_packets {
        if cfg.skip_indices.contains(&index) {
            continue;
        }
        let packet = synthetic::build_packet(cfg, index)?;
        writer.write_packet(index, &packet)?;
    }
    while writer.next_index() < cfg.num_packets {
        writer.write_empty_packet()?;
    }
    let report = writer.finalize()?;
    println!(
        "wrote {} ({} packets, {} bytes, sha256 {})",
        out.display(),
        report.num_packets,
        report.bytes_written,
        report.checksum_hex()
    );
    Ok(ExitCode::SUCCESS)
}

fn print_events(file: &Path, telescope: u8) -> Result<ExitCode> {
    let mut reader = BankFileReader::open(file)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for packet in reader.packets() {
        let packet = packet?;
        let Some(ae) = packet.bank::<bankfile::ArrayEvent>() else {
            continue;
        };
        if let Some(event) = ae.event_by_node_number(telescope) {
            write_event(&mut out, event, false)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_event(file: &Path, telescope: u8, event_number: u32) -> Result<ExitCode> {
    let mut reader = BankFileReader::open(file)?;
    if !reader.has_packet(event_number) {
        eprintln!(
            "You requested event number {event_number}, but the file holds {} packets.",
            reader.num_packets()
        );
        return Ok(ExitCode::FAILURE);
    }
    let packet = reader.read_packet(event_number)?;
    let Some(ae) = packet.bank::<bankfile::ArrayEvent>() else {
        eprintln!("There was no array event for event number {event_number}.");
        return Ok(ExitCode::FAILURE);
    };
    let Some(event) = ae.event_by_node_number(telescope) else {
        eprintln!(
            "There was no event from telescope number {telescope} for event number {event_number}."
        );
        return Ok(ExitCode::FAILURE);
    };
    write_event(&mut io::stdout().lock(), event, true)?;
    Ok(ExitCode::SUCCESS)
}

fn write_event<W: Write>(out: &mut W, event: &EventRecord, decode_gps: bool) -> Result<()> {
    writeln!(out, "-----------------------------------------------")?;
    writeln!(out, "Event number: {}", event.event_number())?;
    writeln!(out, "Event size: {} bytes", event.size()?)?;
    writeln!(out, "Trigger mask: {}", event.trigger_mask())?;
    write!(out, "GPS time words:")?;
    for w in event.gps_time() {
        write!(out, " {w}")?;
    }
    writeln!(out)?;
    if decode_gps {
        writeln!(out, "Decoded GPS time: {}", GpsTime::decode(event.gps_time()))?;
    }
    writeln!(out, "GPS year: {}", event.gps_year())?;
    writeln!(out, "Event type code: {}", event.event_type_code())?;
    writeln!(out, "Flags: {}", event.flags())?;
    writeln!(out, "Number of samples: {}", event.num_samples())?;
    writeln!(out, "Number of channels above threshold: {}", event.num_channels())?;
    writeln!(out, "Number of channels in camera: {}", event.max_num_channels())?;
    writeln!(out, "Number of clock trigger boards: {}", event.num_clock_trig_boards())?;

    let bits = |hit: bool| -> Result<String> {
        (0..event.max_num_channels())
            .map(|ch| {
                let set = if hit { event.hit_bit(ch)? } else { event.trigger_bit(ch)? };
                Ok(if set { '1' } else { '0' })
            })
            .collect()
    };
    writeln!(out, "Hit pattern: {}", bits(true)?)?;
    writeln!(out, "Trigger pattern: {}", bits(false)?)?;

    writeln!(out, "Channel data:")?;
    for ch in 0..event.max_num_channels() {
        match event.channel_hit_index(ch) {
            Some(k) => {
                writeln!(out, "   Channel #{ch}:")?;
                writeln!(out, "      Charge: {}", event.charge(k)?)?;
                writeln!(out, "      Pedestal: {}", event.pedestal(k)?)?;
                writeln!(out, "      Gain switch: {}", if event.hi_lo(k)? { "Hi" } else { "Lo" })?;
                write!(out, "      Samples:")?;
                for s in event.samples(k)? {
                    write!(out, " {s}")?;
                }
                writeln!(out)?;
            }
            None => writeln!(out, "   Channel #{ch}: not hit")?,
        }
    }
    writeln!(out, "Clock trigger board data:")?;
    for board in 0..event.num_clock_trig_boards() {
        write!(out, "   Clock trigger board #{board}:")?;
        for w in event.clock_trig_data(board)? {
            write!(out, " {w}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    path: String,
    format_version: u16,
    run_number: u32,
    config_mask: String,
    finalized: bool,
    file_size: u64,
    num_packets: u32,
    empty_packets: u32,
    array_events: u32,
    telescope_records: u64,
    simulation_banks: u32,
    corsika_banks: u32,
    simulation_headers: u32,
}

fn summary(file: &Path, json: bool) -> Result<ExitCode> {
    let mut reader = BankFileReader::open(file)?;
    let mut s = Summary {
        path: file.display().to_string(),
        format_version: reader.format_version(),
        run_number: reader.run_number(),
        config_mask: reader.config_mask().to_string(),
        finalized: reader.is_finalized(),
        file_size: reader.file_size(),
        num_packets: reader.num_packets(),
        ..Summary::default()
    };
    for packet in reader.packets() {
        let packet = packet?;
        if packet.is_empty() {
            s.empty_packets += 1;
        }
        if let Some(ae) = packet.bank::<bankfile::ArrayEvent>() {
            s.array_events += 1;
            s.telescope_records += ae.num_events() as u64;
        }
        s.simulation_banks += u32::from(packet.has_simulation_data());
        s.corsika_banks += u32::from(packet.has_corsika_simulation_data());
        s.simulation_headers += u32::from(packet.has_simulation_header());
    }

    if json {
        let text = serde_json::to_string_pretty(&s)
            .map_err(|e| Diagnostic::usage(format!("rendering summary: {e}")))?;
        println!("{text}");
    } else {
        println!("File:              {}", s.path);
        println!("Format version:    {}", s.format_version);
        println!("Run number:        {}", s.run_number);
        println!("Config mask:       {}", s.config_mask);
        println!("Finalized:         {}", if s.finalized { "yes" } else { "no" });
        println!("File size:         {} bytes", s.file_size);
        println!("Packets:           {}", s.num_packets);
        println!("  empty:           {}", s.empty_packets);
        println!("  array events:    {}", s.array_events);
        println!("  telescope events: {}", s.telescope_records);
        println!("  simulation:      {}", s.simulation_banks);
        println!("  corsika:         {}", s.corsika_banks);
        println!("  sim headers:     {}", s.simulation_headers);
    }
    Ok(ExitCode::SUCCESS)
}

fn check(file: &Path) -> Result<ExitCode> {
    let mut reader = BankFileReader::open(file)?;
    if !reader.verify_checksum()? {
        eprintln!("{}: not finalized, no checksum to verify", file.display());
        return Ok(ExitCode::FAILURE);
    }
    let mut packets = 0u32;
    for packet in reader.packets() {
        packet?;
        packets += 1;
    }
    println!("{}: checksum OK, {packets} packets decoded", file.display());
    Ok(ExitCode::SUCCESS)
}
