use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "polyglot-chat",
    version,
    about = "Translate text into multiple languages, with speech in and out"
)]
struct Cli {
    /// Target languages: codes or names, comma-separated (default: en)
    #[arg(short = 'l', long = "lang", default_value = "en", value_delimiter = ',')]
    lang: Vec<String>,

    /// File to translate (txt/pdf/docx/image)
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Mime type for --data (auto, txt, pdf, docx, image/*)
    #[arg(short = 'M', long = "data-mime")]
    data_mime: Option<String>,

    /// Record the input from the microphone instead of stdin
    #[arg(short = 'c', long = "capture")]
    capture: bool,

    /// Synthesize speech for each translation and print the file paths
    #[arg(short = 's', long = "speak")]
    speak: bool,

    /// Run the chat web server instead of a one-shot translation
    #[arg(long = "serve")]
    serve: bool,

    /// Listen address for --serve (overrides settings)
    #[arg(long = "listen")]
    listen: Option<String>,

    /// Show the supported language table and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.serve {
        polyglot_chat::logging::init(cli.verbose)?;
        let settings_path = cli.read_settings.as_deref().map(Path::new);
        let settings = polyglot_chat::settings::load_settings(settings_path)?;
        let addr = cli.listen.unwrap_or_else(|| settings.listen.clone());
        return polyglot_chat::server::run_server(settings, addr).await;
    }
    // One-shot output goes to stdout, so logging stays off unless asked.
    if cli.verbose {
        polyglot_chat::logging::init(true)?;
    }

    let needs_stdin = !(cli.show_languages || cli.capture || cli.data.is_some());
    let input = if needs_stdin && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Some(buffer)
    } else {
        None
    };

    let output = polyglot_chat::run(
        polyglot_chat::Config {
            languages: cli.lang,
            data: cli.data,
            data_mime: cli.data_mime,
            capture: cli.capture,
            speak: cli.speak,
            settings_path: cli.read_settings,
            show_languages: cli.show_languages,
        },
        input,
    )
    .await?;

    println!("{}", output);
    Ok(())
}
