use anyhow::Result;
use tracing::{error, info};

use hotel_price_scout::utils::{default_log_file, init_logging};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    let log_file = args.log_file.clone().map(|path| path.unwrap_or_else(default_log_file));
    init_logging(args.verbose, log_file)?;

    info!("Starting hotel price scout v{}", env!("CARGO_PKG_VERSION"));

    match cli::process_command(args).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            Err(e)
        }
    }
}
