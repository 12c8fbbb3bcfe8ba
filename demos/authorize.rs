//! Example QuickPay API client.
//!
//! Authorizes a test payment and captures it right away.
//!
//! Run with:
//! ```bash
//! cargo run --example authorize
//! ```
//!
//! Environment variables:
//! - QUICKPAY_MERCHANT_ID: Your QuickPay merchant id
//! - QUICKPAY_SECRET: The MD5 secret from the QuickPay manager
//! - QUICKPAY_API_KEY: API key, if your IP is not whitelisted
//! - QUICKPAY_API_URL: Alternate API endpoint

use quickpay::{AuthorizeRequest, CaptureRequest, Configuration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut config = Configuration::from_env()?;
    if config.merchant_id.is_none() {
        println!("⚠️  No QUICKPAY_MERCHANT_ID set, using the public test merchant");
        config = config
            .with_merchant_id(89898978)
            .with_secret("29p61DveBZ79c3144LW61lVz1qrwk2gfAFCxPyi5sn49m3Y3IRK5M6SN5d8a68u7");
    }

    let order_number = format!("demo{}", std::process::id());
    println!("💳 Authorizing order {}", order_number);

    let mut authorize = AuthorizeRequest::new(&config)?;
    authorize
        .set_order_number(&order_number)
        .set_amount(100)
        .set_currency("DKK")
        .set_card_number("4571222233334444")
        .set_expiration_date("2612")
        .set_cvd("123")
        .enable_testmode();

    let response = authorize.send().await?;
    if !response.is_valid() {
        eprintln!("❌ Reply failed md5check validation, ignoring it");
        return Ok(());
    }
    println!(
        "   qpstat: {} ({})",
        response.qpstat().unwrap_or("-"),
        response.status_message().unwrap_or("unknown status")
    );

    let Some(transaction) = response.transaction().filter(|_| response.is_success()) else {
        return Ok(());
    };

    println!("📥 Capturing transaction {}", transaction);
    let mut capture = CaptureRequest::new(&config)?;
    capture.set_transaction(transaction).set_amount(100);

    let captured = capture.send().await?;
    println!(
        "   valid: {}, qpstat: {}",
        captured.is_valid(),
        captured.qpstat().unwrap_or("-")
    );

    println!("\n✨ Done!");
    Ok(())
}
