use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Collection to download, e.g. `internlm/internlm-7b`.
    pub collection: String,

    /// Directory to download into. Defaults to a directory named after the
    /// collection's namespace segment.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Base URL of the index host.
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// User agent to use for making requests.
    #[arg(short = 'U', long)]
    pub user_agent: Option<String>,

    #[arg(long, value_name = "(http(s)|socks)://")]
    pub proxy: Option<String>,

    /// Connect timeout in seconds. Fractions are supported.
    #[arg(long, value_name = "SECONDS")]
    pub connect_timeout: Option<f64>,

    /// Should we accept invalid SSL certificates? Do not use unless you are
    /// absolutely sure of what you are doing.
    #[arg(long, default_value_t = false)]
    pub accept_invalid_certs: bool,

    /// Custom HTTP headers to include in each request. Specify as `KEY:VALUE`.
    #[arg(long = "header", value_name = "KEY:VALUE", num_args = 0.., action = clap::ArgAction::Append)]
    pub headers: Vec<String>,
}
