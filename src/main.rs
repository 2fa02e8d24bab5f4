use clap::{Parser, Subcommand};
use zss::{Reader, ReaderOptions};

#[derive(Parser)]
#[command(name = "zss", version = "0.1.0", about = "The ZSS sorted record container CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header metadata and tree statistics
    Info {
        /// Local path, or an http(s):// URL
        input: String,
        /// Print only the JSON metadata blob, nothing else
        #[arg(long)]
        metadata_only: bool,
    },
    /// Dump records in [start, stop) intersected with prefix to stdout
    Dump {
        input: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        stop: Option<String>,
        #[arg(long)]
        prefix: Option<String>,
        /// Byte to print after each record, given as a decimal (default 10 = '\n')
        #[arg(long, default_value = "10")]
        terminator: u8,
    },
    /// Walk the full tree and verify every structural invariant
    Validate {
        input: String,
    },
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("zss: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Info { input, metadata_only } => {
            let reader = open(&input)?;
            if metadata_only {
                println!("{}", serde_json::to_string_pretty(reader.metadata())?);
                return Ok(());
            }
            let info = serde_json::json!({
                "root_index_offset": reader.root_index_offset(),
                "root_index_length": reader.root_index_length(),
                "total_file_length": reader.total_file_length(),
                "codec": reader.codec_name(),
                "data_sha256": hex::encode(reader.data_sha256()),
                "metadata": reader.metadata(),
                "statistics": {
                    "root_index_level": reader.root_index_level(),
                },
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Dump { input, start, stop, prefix, terminator } => {
            let reader = open(&input)?;
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            reader.dump(
                start.as_deref().map(str::as_bytes),
                stop.as_deref().map(str::as_bytes),
                prefix.as_deref().map(str::as_bytes),
                terminator,
                &mut lock,
            )?;
        }

        Commands::Validate { input } => {
            let reader = open(&input)?;
            reader.validate()?;
            println!("OK");
        }
    }

    Ok(())
}

fn open(input: &str) -> zss::Result<Reader> {
    if input.starts_with("http://") || input.starts_with("https://") {
        Reader::open_url(input, ReaderOptions::default())
    } else {
        Reader::open(input, ReaderOptions::default())
    }
}
