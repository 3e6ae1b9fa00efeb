use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tradesocket::core::config::ConnectionConfig;
use tradesocket::core::types::{ExchangeType, InstrumentKind, Ticker};
use tradesocket::utils::exchange_factory::ExchangeFactory;

fn load_config(exchange: &str) -> ConnectionConfig {
    #[cfg(feature = "env-file")]
    let loaded = ConnectionConfig::from_env_file(exchange);
    #[cfg(not(feature = "env-file"))]
    let loaded = ConnectionConfig::from_env(exchange);

    loaded.unwrap_or_else(|e| {
        warn!(exchange, error = %e, "no credentials found, using public endpoints");
        ConnectionConfig::read_only(&exchange.to_lowercase())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let service = ExchangeFactory::build_service(vec![load_config("DERIBIT"), load_config("OKX")])
        .context("failed to configure venues")?;

    service.events().subscribe(|ticker: Ticker| async move {
        info!(
            exchange = %ticker.exchange,
            code = %ticker.code,
            kind = ?ticker.instrument_type,
            expiry = ?ticker.exp_date,
            "Security contract arrived"
        );
    });

    let cancel = CancellationToken::new();
    service.start(ExchangeType::Deribit, &cancel).await?;
    service.start(ExchangeType::Okx, &cancel).await?;

    if let Some(deribit) = service.client(ExchangeType::Deribit) {
        deribit.subscribe_ticker("BTC-PERPETUAL", &cancel).await?;
        deribit
            .list_instruments("BTC", Some(InstrumentKind::Future), &cancel)
            .await?;
    }
    if let Some(okx) = service.client(ExchangeType::Okx) {
        okx.subscribe_ticker("BTC-USDT", &cancel).await?;
        okx.list_instruments("BTC-USD", Some(InstrumentKind::Option), &cancel)
            .await?;
    }

    info!("Press Ctrl-C to stop...");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    for exchange in service.exchanges() {
        if let Err(e) = service.stop(exchange, &cancel).await {
            warn!(exchange = %exchange, error = %e, "stop failed");
        }
    }
    Ok(())
}
