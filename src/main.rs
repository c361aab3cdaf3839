use clap::{Parser as ClapParser, Subcommand};
use env_logger::Env;
use odata_query::ODataVersion;
use odata_query::cli::{self, CliError, RunOptions};
use std::collections::HashMap;
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "odata")]
#[command(about = "Tokenize, parse and run OData URLs against JSON data")]
#[command(version)]
struct Cli {
    /// Accepted protocol versions: v2, v3, v4 or all, combined with '|'
    #[arg(long, global = true, default_value = "all")]
    version_flags: ODataVersion,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tokens of a URL
    Tokens {
        /// The OData URL
        url: String,
    },

    /// Show the path segments and query options of a URL
    Parse {
        /// The OData URL
        url: String,
    },

    /// Run a URL's query options against a JSON array
    Run {
        /// The OData URL
        url: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Cap on the number of items returned
        #[arg(long)]
        max_page_size: Option<u64>,

        /// Key properties of an entity set, as SET=KEY[,KEY]
        #[arg(long = "key")]
        keys: Vec<String>,

        /// Leading path segments that address the service
        #[arg(long, default_value_t = 0)]
        root_segments: usize,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let version = cli.version_flags;

    let result = match cli.command {
        Commands::Tokens { url } => run_tokens(&url, version),
        Commands::Parse { url } => cli::describe(&url, version).map(|text| print!("{}", text)),
        Commands::Run {
            url,
            input,
            pretty,
            max_page_size,
            keys,
            root_segments,
        } => run_query(url, input, pretty, max_page_size, keys, root_segments, version),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run_tokens(url: &str, version: ODataVersion) -> Result<(), CliError> {
    for token in cli::list_tokens(url, version)? {
        println!("{:<16} {}", format!("{:?}", token.kind()), token.text());
    }
    Ok(())
}

fn run_query(
    url: String,
    input: Option<String>,
    pretty: bool,
    max_page_size: Option<u64>,
    key_args: Vec<String>,
    root_segments: usize,
    version: ODataVersion,
) -> Result<(), CliError> {
    let input = match input {
        Some(s) => Some(s),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer).map_err(CliError::Io)?;
            Some(buffer)
        }
        None => None,
    };

    let mut keys = HashMap::new();
    for arg in &key_args {
        let (set, props) = cli::parse_key_arg(arg)?;
        keys.insert(set, props);
    }

    let options = RunOptions {
        url,
        input,
        version,
        max_page_size,
        keys,
        root_segments,
    };

    let output = cli::execute_run(&options)?;
    let json = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    }?;
    println!("{}", json);
    Ok(())
}
