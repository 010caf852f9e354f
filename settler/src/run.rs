//! Startup wiring: configuration to a serving settlement node.

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use axum::Router;
use axum::http::Method;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cab_rs::engine::CabPaymaster;
use cab_rs::ledger::InvoiceLedger;
use cab_rs::onchain::{OnchainEventProver, OnchainVault};
use cab_rs::vault::{InMemoryVault, VaultWithdraw};
use cab_rs::verifier::{AttestationVerifier, EventProofVerifier, InvoiceVerifier};

use crate::config::{Config, ConfigError, VaultConfig, VerifierConfig};
use crate::handlers::{self, AppState};
use crate::sig_down::SigDown;

/// Boots the node: loads configuration, wires the engine and ledger, and
/// serves until a termination signal arrives.
pub async fn run() -> Result<(), Box<dyn Error>> {
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .expect("Failed to install rustls crypto provider");
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load()?;
    let host = config.host();
    let port = config.port();
    let state = build_state(&config)?;
    tracing::info!(
        chain_id = config.chain_id,
        paymaster = %config.paymaster,
        trusted_signer = %config.trusted_signer,
        "Settlement node configured"
    );

    let app = Router::new()
        .merge(handlers::routes().with_state(Arc::new(state)))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers(Any),
        );

    let addr = SocketAddr::new(host, port);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    let sig_down = SigDown::try_new()?;
    let token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    Ok(())
}

/// Builds the engine and ledger from configuration.
///
/// A provider is dialed only when something needs one: event-proof
/// verifiers and onchain vaults do, attestation verifiers and the
/// in-memory vault do not.
fn build_state(config: &Config) -> Result<AppState, ConfigError> {
    let paymaster = CabPaymaster::new(
        config.paymaster,
        config.chain_id,
        config.trusted_signer,
        config.repay_routes.clone(),
    );

    let provider = connect_provider(config)?;

    let mut verifiers: HashMap<Address, Arc<dyn InvoiceVerifier>> = HashMap::new();
    for entry in &config.verifiers {
        match entry {
            VerifierConfig::EventProof { address, prover } => {
                let provider = provider.clone().ok_or(ConfigError::MissingRpc)?;
                let oracle = OnchainEventProver::new(*prover, provider);
                verifiers.insert(*address, Arc::new(EventProofVerifier::new(oracle)));
            }
            VerifierConfig::Attestation { address, attestor } => {
                verifiers.insert(*address, Arc::new(AttestationVerifier::new(*attestor)));
            }
        }
    }

    let vault: Arc<dyn VaultWithdraw> = match &config.vault {
        VaultConfig::InMemory => Arc::new(InMemoryVault::new()),
        VaultConfig::Onchain { address } => {
            if config.wallet_key.is_none() {
                return Err(ConfigError::MissingWalletKey);
            }
            let provider = provider.clone().ok_or(ConfigError::MissingRpc)?;
            Arc::new(OnchainVault::new(*address, provider))
        }
    };

    let ledger = InvoiceLedger::new(config.chain_id, verifiers, vault);
    Ok(AppState { paymaster, ledger })
}

fn connect_provider(config: &Config) -> Result<Option<DynProvider>, ConfigError> {
    let Some(rpc) = config.rpc.as_ref() else {
        return Ok(None);
    };
    let url = rpc.inner().clone();
    let provider = match config.wallet_key.as_ref() {
        Some(key) => {
            let signer = key
                .inner()
                .parse::<PrivateKeySigner>()
                .map_err(|e| ConfigError::InvalidWalletKey(e.to_string()))?;
            let wallet = EthereumWallet::from(signer);
            ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(url)
                .erased()
        }
        None => ProviderBuilder::new().connect_http(url).erased(),
    };
    Ok(Some(provider))
}
