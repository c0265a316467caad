use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "vizrec-proxy")]
#[command(version, about = "REST façade for a visual recognition service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VIZREC_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Recognition service base URL
    #[arg(short, long, env = "VIZREC_SERVICE_URL")]
    pub service_url: Option<String>,

    /// Directory holding index.html, 404.html and img/favicon.ico
    #[arg(short, long, env = "VIZREC_ASSETS")]
    pub assets: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
