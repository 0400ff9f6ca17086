use bacalhau_config::{load_node_config, CliArgs};
use bacalhau_node::run_node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = load_node_config(&args.config_path)?;

    if let Err(e) = run_node(config).await {
        eprintln!("Node service error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
