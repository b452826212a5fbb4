//! Stream normalized market data from one exchange to stdout

use anyhow::{Result, bail};
use clap::Parser;
use feeds::{ClientEvent, MarketEvent};
use common::Market;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "stream")]
#[command(about = "Subscribe to an exchange and print normalized events")]
#[command(version)]
struct Cli {
    /// Exchange to connect to: binance, kraken, coinbase, huobi
    exchange: String,

    /// Markets as id:base:quote triples, e.g. BTCUSDT:BTC:USDT
    #[arg(required = true)]
    markets: Vec<String>,

    /// Subscribe to the trade stream (default when nothing is chosen)
    #[arg(long)]
    trades: bool,

    /// Subscribe to the ticker stream
    #[arg(long)]
    tickers: bool,

    /// Subscribe to level-2 diffs
    #[arg(long)]
    l2_updates: bool,
}

fn parse_market(spec: &str) -> Result<Market> {
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [id, base, quote] => Ok(Market::new(*id, *base, *quote)),
        _ => bail!("market spec '{spec}' is not id:base:quote"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let markets = cli
        .markets
        .iter()
        .map(|spec| parse_market(spec))
        .collect::<Result<Vec<_>>>()?;

    let (client, mut events) = match cli.exchange.as_str() {
        "binance" => feeds::binance::client(),
        "kraken" => feeds::kraken::client(),
        "coinbase" => feeds::coinbase::client(),
        "huobi" => feeds::huobi::client(),
        other => bail!("unknown exchange '{other}'"),
    };

    let trades = cli.trades || (!cli.tickers && !cli.l2_updates);
    for market in &markets {
        if trades {
            client.subscribe_trades(market);
        }
        if cli.tickers {
            client.subscribe_ticker(market);
        }
        if cli.l2_updates {
            client.subscribe_level2_updates(market);
        }
    }
    info!(exchange = %cli.exchange, markets = markets.len(), "streaming; ctrl-c to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                None | Some(ClientEvent::Closed) => break,
                Some(ClientEvent::Data(payload, market)) => print_event(&payload, &market),
                Some(ClientEvent::Error(err)) => warn!(error = %err, "feed error"),
                Some(lifecycle) => info!(?lifecycle, "lifecycle"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                client.close();
            }
        }
    }
    Ok(())
}

fn print_event(event: &MarketEvent, market: &Market) {
    match event {
        MarketEvent::Trade(trade) => {
            println!(
                "[{}] trade {} {} {} @ {}",
                market.id, trade.unix_ms, trade.side, trade.amount, trade.price
            );
        }
        MarketEvent::Ticker(ticker) => {
            println!("[{}] ticker last={}", market.id, ticker.last);
        }
        MarketEvent::Level2Update(update) => {
            println!(
                "[{}] l2update +{} asks +{} bids",
                market.id,
                update.asks.len(),
                update.bids.len()
            );
        }
        MarketEvent::Level2Snapshot(snapshot) => {
            println!(
                "[{}] l2snapshot {} asks / {} bids",
                market.id,
                snapshot.asks.len(),
                snapshot.bids.len()
            );
        }
        other => println!("[{}] {}", market.id, other.stream_name()),
    }
}
