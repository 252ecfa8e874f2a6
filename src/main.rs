use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    botpanel::run().await
}
