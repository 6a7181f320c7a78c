use clap::Parser;
use tracing::info;

use wewrite_views::config::{StaticConfig, args::Args, get_config, init_config_from};
use wewrite_views::runtime::run_server;
use wewrite_views::system::init_logging;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.generate_config {
        println!("{}", StaticConfig::generate_sample_config());
        return Ok(());
    }

    init_config_from(args.config.as_deref());
    let config = get_config();

    // 必须保持到进程退出，否则非阻塞日志不会刷出
    let _log_guard = init_logging(&config.logging)?;
    info!("wewrite-views {} starting", env!("CARGO_PKG_VERSION"));

    run_server().await
}
