use clap::{Parser, Subcommand};
use gaspay::application::orchestrator::{PaymentOrchestrator, PaymentOutcome};
use gaspay::config::AppConfig;
use gaspay::domain::intent::{IntentKind, PaymentIntent, PaymentMethod};
use gaspay::domain::ports::{GatewayCheckout, GatewayClientBox, PaymentBackendBox};
use gaspay::domain::session::{Credential, Session};
use gaspay::domain::wallet::{Amount, Balance};
use gaspay::infrastructure::gateway::{PopupGateway, RedirectGateway, SandboxBehavior, SandboxGateway};
use gaspay::infrastructure::http_backend::HttpPaymentBackend;
use gaspay::infrastructure::in_memory::InMemoryBackend;
use miette::{IntoDiagnostic, Result, miette};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Bearer token for the backend. Defaults to GASPAY_TOKEN.
    #[arg(long)]
    token: Option<String>,

    /// Backend base URL. Defaults to GASPAY_API_URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Pay against an in-memory sandbox ledger instead of the backend.
    #[arg(long)]
    sandbox: bool,

    /// Opening wallet balance of the sandbox ledger.
    #[arg(long, default_value = "0")]
    sandbox_balance: Decimal,

    /// Sandbox payer behaviour: approve, decline, cancel or vanish.
    #[arg(long, default_value = "approve")]
    sandbox_behavior: SandboxBehavior,

    /// Use the embedded checkout instead of a full-page redirect.
    #[arg(long)]
    popup: bool,

    /// Abandon a payment that has not finished after this many seconds.
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pay for an order, a subscription or a wallet top-up.
    Pay {
        /// order, subscription or topup
        #[arg(long)]
        kind: String,

        /// Order or plan id. Omit for top-ups.
        #[arg(long)]
        subject: Option<String>,

        /// Amount in major units (e.g. 1500.50).
        #[arg(long)]
        amount: Decimal,

        #[arg(long)]
        email: String,

        /// wallet or gateway
        #[arg(long, default_value = "gateway")]
        method: String,
    },
    /// Complete a redirected payment from the URL the gateway returned to.
    Resume { return_url: String },
    /// Show the current wallet balance.
    Balance,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let token = cli.token.clone().or(config.token.clone());

    let (backend, gateway): (PaymentBackendBox, GatewayClientBox) = if cli.sandbox {
        let ledger = InMemoryBackend::new(Balance::new(cli.sandbox_balance));
        let gateway: GatewayClientBox =
            Box::new(SandboxGateway::new(ledger.clone(), cli.sandbox_behavior));
        let backend: PaymentBackendBox = Box::new(ledger);
        (backend, gateway)
    } else {
        let api_url = cli.api_url.clone().unwrap_or(config.api_url.clone());
        let backend: PaymentBackendBox =
            Box::new(HttpPaymentBackend::new(&api_url, config.http_timeout).into_diagnostic()?);
        let gateway: GatewayClientBox = if cli.popup {
            let (popup, opened) = PopupGateway::new();
            tokio::spawn(drive_popup(popup.clone(), opened));
            Box::new(popup)
        } else {
            Box::new(RedirectGateway)
        };
        (backend, gateway)
    };

    // The sandbox accepts any token, so one is never required there.
    let credential = match token {
        Some(token) => Some(Credential::bearer(token)),
        None if cli.sandbox => Some(Credential::bearer("sandbox")),
        None => None,
    };
    let orchestrator = PaymentOrchestrator::new(backend, gateway, Session::new(credential))
        .with_callback_url(config.callback_url.clone());

    let mut states = orchestrator.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let label = states.borrow_and_update().label();
            eprintln!("[{}]", label);
        }
    });

    let limit = Duration::from_secs(cli.timeout_secs);
    match cli.command {
        Command::Pay {
            kind,
            subject,
            amount,
            email,
            method,
        } => {
            let kind: IntentKind = kind.parse().into_diagnostic()?;
            let method: PaymentMethod = method.parse().into_diagnostic()?;
            let amount = Amount::new(amount).into_diagnostic()?;
            let intent =
                PaymentIntent::new(kind, subject, amount, email, method).into_diagnostic()?;

            let outcome = tokio::time::timeout(limit, orchestrator.pay(intent))
                .await
                .map_err(|_| miette!("Payment abandoned after {} seconds", cli.timeout_secs))?
                .into_diagnostic()?;
            render(&outcome);
        }
        Command::Resume { return_url } => {
            let outcome = tokio::time::timeout(limit, orchestrator.resume_from_return_url(&return_url))
                .await
                .map_err(|_| miette!("Verification abandoned after {} seconds", cli.timeout_secs))?
                .into_diagnostic()?;
            render(&outcome);
        }
        Command::Balance => {
            let balance = orchestrator.refresh_balance().await.into_diagnostic()?;
            println!("balance={}", balance);
        }
    }

    Ok(())
}

fn render(outcome: &PaymentOutcome) {
    match outcome {
        PaymentOutcome::Settled(settlement) => {
            let reference = settlement
                .reference
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string());
            let balance = settlement
                .wallet_balance
                .map(|b| b.to_string())
                .unwrap_or_else(|| "unchanged".to_string());
            println!(
                "settled reference={} amount={} balance={}",
                reference,
                settlement.amount.normalize(),
                balance
            );
        }
        PaymentOutcome::AwaitingRedirect {
            reference,
            authorization_url,
        } => {
            println!("redirect reference={} url={}", reference, authorization_url);
        }
    }
}

/// Stands in for the checkout popup: shows the payment page and asks the payer
/// on stdin whether they paid.
async fn drive_popup(gateway: PopupGateway, mut opened: mpsc::UnboundedReceiver<GatewayCheckout>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(checkout) = opened.recv().await {
        eprintln!(
            "Pay {} kobo at {} then type 'paid', or anything else to close the checkout.",
            checkout.amount_minor, checkout.authorization_url
        );
        let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("paid") {
            gateway.complete(&checkout.reference).await;
        } else {
            gateway.close(&checkout.reference).await;
        }
    }
}
