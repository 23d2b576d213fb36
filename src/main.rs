#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gas_station_erp_lib::run().await
}
