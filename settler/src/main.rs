//! `cab-settler` binary: the settlement node HTTP server.
//!
//! Sponsors operations on its configured chain and settles the resulting
//! invoices against registered verifiers.
//!
//! Endpoints:
//! - `POST /validate`: would this operation be sponsored right now?
//! - `POST /registrations`: bind a paymaster and verifier to an account.
//! - `GET /registrations/{account}`: read a binding.
//! - `DELETE /registrations/{account}`: remove an expired binding.
//! - `POST /invoices`: record an invoice.
//! - `GET /invoices/{id}`: read an invoice record.
//! - `POST /repay`: settle an invoice against a proof.
//! - `POST /withdrawals`: refund vault balances to the account itself.
//! - `GET /healthz`: liveness probe.
//!
//! Configuration comes from a JSON file named by `--config` or `$CONFIG`
//! (default `./config.json`), with `$HOST`, `$PORT`, and `$RUST_LOG`
//! honored from the environment. See `config.rs` for the schema.

mod config;
mod handlers;
mod run;
mod sig_down;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        println!("{e}");
        process::exit(1)
    }
}
