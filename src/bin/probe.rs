/// Bridge connection probe — runs the MT5 bridge through numbered checks
/// (reachability, terminal, account, symbol data, trading permissions)
/// before the trader is let loose on it.
/// Run: cargo run --bin probe [BASE_URL]
use hmac::{Hmac, Mac};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<sha2::Sha256>;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8228";
const PROBE_SYMBOLS: &[&str] = &["EURUSD", "GBPUSD", "USDJPY"];

struct ProbeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl ProbeClient {
    fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("HTTP client build failed");
        let api_key = std::env::var("BRIDGE_API_KEY").expect("BRIDGE_API_KEY env var not set");
        let api_secret = std::env::var("BRIDGE_SECRET").expect("BRIDGE_SECRET env var not set");
        ProbeClient { client, base_url, api_key, api_secret }
    }

    async fn get(&self, path_query: &str) -> Result<serde_json::Value, String> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis()
            .to_string();
        let query = path_query.split('?').nth(1).unwrap_or("");
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC init failed");
        mac.update(format!("{}{}{}", ts, self.api_key, query).as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let url = format!("{}{}", self.base_url, path_query);
        let resp = self
            .client
            .get(&url)
            .header("X-BRIDGE-API-KEY", &self.api_key)
            .header("X-BRIDGE-TIMESTAMP", &ts)
            .header("X-BRIDGE-SIGN", signature)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {}", e))?;

        let json: serde_json::Value =
            resp.json().await.map_err(|e| format!("parse error: {}", e))?;
        let retcode = json["retcode"].as_i64().unwrap_or(-1);
        if retcode != 0 {
            return Err(format!(
                "retcode={} msg={}",
                retcode,
                json["msg"].as_str().unwrap_or("unknown")
            ));
        }
        Ok(json["data"].clone())
    }
}

#[tokio::main]
async fn main() {
    let base_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    println!("MT5 Bridge Connection Probe");
    println!("Bridge: {}", base_url);
    println!("{}", "=".repeat(50));

    let client = ProbeClient::new(base_url);
    let mut passed = 0u32;
    let total = 5u32;

    // Test 1: bridge reachable
    print!("Test 1: Bridge reachability... ");
    let terminal = match client.get("/api/v1/terminal").await {
        Ok(data) => {
            println!("✅ PASSED");
            passed += 1;
            Some(data)
        }
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {}", e);
            None
        }
    };

    // Test 2: terminal information
    print!("Test 2: Terminal information... ");
    match &terminal {
        Some(data) if data["build"].as_i64().is_some() => {
            println!("✅ PASSED");
            println!("   Build: {}", data["build"]);
            println!("   Connected: {}", data["connected"]);
            passed += 1;
        }
        _ => println!("❌ FAILED"),
    }

    // Test 3: account information
    print!("Test 3: Account information... ");
    let account = client.get("/api/v1/account").await;
    match &account {
        Ok(data) => {
            println!("✅ PASSED");
            println!("   Account: {}", data["login"]);
            println!("   Server: {}", data["server"].as_str().unwrap_or("?"));
            println!("   Currency: {}", data["currency"].as_str().unwrap_or("?"));
            println!(
                "   Balance: {:.2} | Equity: {:.2} | Free margin: {:.2}",
                data["balance"].as_f64().unwrap_or(0.0),
                data["equity"].as_f64().unwrap_or(0.0),
                data["margin_free"].as_f64().unwrap_or(0.0)
            );
            passed += 1;
        }
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {}", e);
        }
    }

    // Test 4: symbol data retrieval
    print!("Test 4: Symbol data retrieval... ");
    let mut ticks: Vec<(String, serde_json::Value)> = Vec::new();
    for symbol in PROBE_SYMBOLS {
        if let Ok(data) = client.get(&format!("/api/v1/tick?symbol={}", symbol)).await {
            ticks.push((symbol.to_string(), data));
        }
    }
    if !ticks.is_empty() {
        println!("✅ PASSED");
        println!("   Data for {}/{} symbols", ticks.len(), PROBE_SYMBOLS.len());
        passed += 1;
    } else {
        println!("❌ FAILED");
        println!("   No symbol data available");
    }

    // Test 5: trading permissions
    print!("Test 5: Trading permissions... ");
    match &account {
        Ok(data) => {
            let trade_allowed = data["trade_allowed"].as_bool().unwrap_or(false);
            let trade_expert = data["trade_expert"].as_bool().unwrap_or(false);
            if trade_allowed && trade_expert {
                println!("✅ PASSED");
                println!("   Trading and expert advisors allowed");
                passed += 1;
            } else {
                println!("⚠️ PARTIAL");
                println!("   Trading allowed: {}", trade_allowed);
                println!("   EA allowed: {}", trade_expert);
            }
        }
        Err(_) => println!("❌ FAILED"),
    }

    println!("\n{}", "=".repeat(50));
    println!("Tests completed: {}/{} passed", passed, total);

    if !ticks.is_empty() {
        println!("\nCurrent market data:");
        println!("{:<10} {:<10} {:<10} {:<10}", "Symbol", "Bid", "Ask", "Spread");
        println!("{}", "-".repeat(42));
        for (symbol, tick) in &ticks {
            let bid = tick["bid"].as_f64().unwrap_or(0.0);
            let ask = tick["ask"].as_f64().unwrap_or(0.0);
            println!("{:<10} {:<10.5} {:<10.5} {:<10.5}", symbol, bid, ask, ask - bid);
        }
    }

    if passed < total {
        println!("\nTroubleshooting tips:");
        println!("1. Ensure the MT5 terminal and the bridge service are running");
        println!("2. Check BRIDGE_API_KEY / BRIDGE_SECRET environment variables");
        println!("3. Verify the trading account is logged in");
        println!("4. Enable algorithmic trading in MT5 (Tools > Options > Expert Advisors)");
        std::process::exit(1);
    }
}
