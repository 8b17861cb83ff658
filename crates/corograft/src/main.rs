use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use corograft_core::parser::{parse_register_lines, ParsedLines};
use corograft_core::CoreSession;
use corograft_utils::{error, info, LogFormat, LogLevel, LoggingConfig};

/// Graft user-space coroutines into an ELF core dump as synthetic threads.
#[derive(Parser, Debug)]
#[command(name = "corograft")]
#[command(version)]
#[command(about = "Graft user-space coroutines into an ELF core dump as synthetic threads", long_about = None)]
struct Cli
{
    /// Core file to edit in place
    corefile: PathBuf,
    /// File with one `NAME:VALUE ...` register line per coroutine (`-` reads stdin)
    registers: String,
    /// Scan and parse only, do not modify the core file
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// Log format (pretty or json); overrides COROGRAFT_LOG_FORMAT
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

fn main()
{
    let cli = Cli::parse();

    // CLI flags take precedence over the environment
    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging.level = Some(level);
    }
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    let _guard = match logging.init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(&cli) {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>>
{
    println!("core file {}", cli.corefile.display());
    let mut session = CoreSession::open(&cli.corefile)?;
    println!("{}", session.summary());

    let parsed = read_register_lines(&cli.registers)?;
    if !parsed.rejected.is_empty() {
        println!("skipped {} unparseable register lines", parsed.rejected.len());
    }

    if cli.dry_run {
        println!("dry run: {} threads would be appended", parsed.threads.len());
        return Ok(());
    }

    let report = session.append_threads(&parsed.threads)?;
    match (report.thread_ids.first(), report.thread_ids.last()) {
        (Some(first), Some(last)) => {
            println!(
                "appended {} threads with ids {first}..={last}; note segment now at offset {} size {}",
                report.thread_ids.len(),
                report.descriptor.offset(),
                report.descriptor.file_size()
            );
        }
        _ => println!("no thread to append"),
    }
    Ok(())
}

fn read_register_lines(source: &str) -> io::Result<ParsedLines>
{
    if source == "-" {
        info!("reading register lines from stdin");
        parse_register_lines(io::stdin().lock())
    } else {
        let file = File::open(source)
            .map_err(|e| io::Error::new(e.kind(), format!("cannot open register file {source}: {e}")))?;
        parse_register_lines(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_flags()
    {
        let cli = Cli::try_parse_from(["corograft", "core.1", "regs.txt", "--dry-run", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.corefile, PathBuf::from("core.1"));
        assert_eq!(cli.registers, "regs.txt");
        assert!(cli.dry_run);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.log_format, None);
    }

    #[test]
    fn test_cli_requires_both_paths()
    {
        assert!(Cli::try_parse_from(["corograft", "core.1"]).is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_log_format()
    {
        assert!(Cli::try_parse_from(["corograft", "core.1", "regs.txt", "--log-format", "xml"]).is_err());
    }

    #[test]
    fn test_read_register_file()
    {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "RSP:0x7ffeeb1a0c20 RIP:0x401234").unwrap();
        writeln!(file, "RSP:0x1 BOGUS:2").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "rsp:0x2000 rip:0x402000").unwrap();

        let parsed = read_register_lines(file.path().to_str().unwrap()).unwrap();
        assert_eq!(parsed.threads.len(), 2);
        assert_eq!(parsed.rejected.len(), 1);
        assert_eq!(parsed.rejected[0].line_number, 2);
    }

    #[test]
    fn test_missing_register_file_names_path()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let err = read_register_lines(path.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }
}
