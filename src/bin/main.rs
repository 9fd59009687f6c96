use penshort::{server, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;
    server::run(config).await?;
    Ok(())
}
