//! Example hosted payment window integration.
//!
//! Serves a checkout page with a signed QuickPay form and a callback endpoint
//! that validates what the gateway posts back.
//!
//! Run with:
//! ```bash
//! cargo run --example hosted_form
//! ```

use axum::{response::Html, routing::get, routing::post, Router};
use quickpay::{AuthorizeForm, Configuration, ParsedResponse, Secret};

const MERCHANT_ID: u64 = 89898978;
const SECRET: &str = "29p61DveBZ79c3144LW61lVz1qrwk2gfAFCxPyi5sn49m3Y3IRK5M6SN5d8a68u7";

async fn checkout() -> Html<String> {
    let config = Configuration::new(MERCHANT_ID, SECRET);
    let html = match AuthorizeForm::new(&config) {
        Ok(mut form) => {
            form.set_order_number(&format!("web{}", std::process::id()))
                .set_amount(9900)
                .set_currency("DKK")
                .set_language("en")
                .set_continue_url("http://localhost:3000/")
                .set_cancel_url("http://localhost:3000/")
                .set_callback_url("http://localhost:3000/callback")
                .enable_testmode()
                .set_custom("basket", "demo");

            let rendered = form.render();
            format!(
                r#"<form method="post" action="{}">{}<button>Pay</button></form>"#,
                rendered.action,
                rendered.to_html()
            )
        }
        Err(e) => format!("<p>Configuration error: {}</p>", e),
    };
    Html(html)
}

async fn callback(body: String) -> &'static str {
    match ParsedResponse::from_form_body(&body, Some(Secret::new(SECRET))) {
        Ok(response) if response.is_valid() => {
            tracing::info!(
                ordernumber = response.order_number().unwrap_or_default(),
                qpstat = response.qpstat().unwrap_or_default(),
                basket = response.custom("basket").unwrap_or_default(),
                "payment callback accepted"
            );
            "OK"
        }
        Ok(_) => {
            tracing::warn!("callback rejected: md5check mismatch");
            "INVALID"
        }
        Err(e) => {
            tracing::warn!(error = %e, "callback could not be decoded");
            "INVALID"
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let app = Router::new()
        .route("/", get(checkout))
        .route("/callback", post(callback));

    println!("🛒 Checkout on http://localhost:3000/");
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
