//! Home-chain invoice ledger and settlement.
//!
//! [`InvoiceLedger`] is the system of record for repayment obligations.
//! It stores one [`Invoice`] per content-derived id, resolves accounts to
//! the verifier their registration names, and settles invoices by pulling
//! repayment out of vaults through the [`VaultWithdraw`] seam.
//!
//! Settlement is at-most-once. The `repaid` flag flips under the record's
//! entry lock before the vault is called, so a second settlement attempt
//! observes the flag no matter how the external call interleaves. If the
//! vault call then fails, the flag is restored and the caller may retry.
//!
//! Externally-triggered calls back into the ledger from within a
//! settlement are refused outright. The guard is per task: a vault or
//! verifier implementation that re-enters `repay` or
//! `withdraw_to_account` while one is in flight on the same task gets
//! [`LedgerError::ReentrantCall`].

use alloy_primitives::{Address, U256};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use cab_types::invoice::{Invoice, InvoiceDetails, InvoiceId, RepayTokenInfo};
use cab_types::registration::Registration;
use cab_types::timestamp::UnixTimestamp;

use crate::registry::{RegistrationRegistry, RegistryError};
use crate::vault::{VaultError, VaultWithdraw};
use crate::verifier::InvoiceVerifier;

tokio::task_local! {
    static IN_SETTLEMENT: ();
}

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Registration bookkeeping failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// An invoice with this id is already recorded.
    #[error("invoice {0} already exists")]
    AlreadyExists(InvoiceId),
    /// No invoice with this id is recorded on this ledger.
    #[error("invoice {0} is not known to this ledger")]
    UnknownInvoice(InvoiceId),
    /// The invoice has already been settled.
    #[error("invoice {0} is already repaid")]
    AlreadyRepaid(InvoiceId),
    /// The account has no registration, or its registration names a
    /// verifier this ledger does not have installed.
    #[error("no invoice verifier available for account {0}")]
    NoVerifier(Address),
    /// The proof did not verify against the claimed invoice.
    #[error("proof does not verify for invoice {0}")]
    InvalidInvoice(InvoiceId),
    /// A refund withdrawal was triggered by someone other than the
    /// account's registered paymaster.
    #[error("caller {caller} is not the registered paymaster for account {account}")]
    Unauthorized { caller: Address, account: Address },
    /// A settlement call arrived from within another settlement call.
    #[error("reentrant settlement call refused")]
    ReentrantCall,
    /// The vault refused or failed the withdrawal.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// The result of a successful repayment: which obligations on this chain
/// were settled, and to whom the funds went.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub invoice_id: InvoiceId,
    /// The paymaster the withdrawal was made out to.
    pub recipient: Address,
    /// The subset of the invoice's obligations that named this chain.
    pub repaid: Vec<RepayTokenInfo>,
}

/// The invoice ledger for one home chain.
pub struct InvoiceLedger {
    chain_id: u64,
    invoices: DashMap<InvoiceId, Invoice>,
    registry: RegistrationRegistry,
    verifiers: HashMap<Address, Arc<dyn InvoiceVerifier>>,
    vault: Arc<dyn VaultWithdraw>,
}

impl InvoiceLedger {
    pub fn new(
        chain_id: u64,
        verifiers: HashMap<Address, Arc<dyn InvoiceVerifier>>,
        vault: Arc<dyn VaultWithdraw>,
    ) -> Self {
        Self {
            chain_id,
            invoices: DashMap::new(),
            registry: RegistrationRegistry::new(),
            verifiers,
            vault,
        }
    }

    /// The chain this ledger settles for. Only repay obligations naming
    /// this id are withdrawn here.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Installs a registration for `account`. See
    /// [`RegistrationRegistry::register`] for the expiry rules.
    #[instrument(skip_all, err)]
    pub fn register_paymaster(
        &self,
        account: Address,
        registration: Registration,
        now: UnixTimestamp,
    ) -> Result<(), LedgerError> {
        self.registry.register(account, registration, now)?;
        tracing::info!(
            %account,
            paymaster = %registration.paymaster,
            verifier = %registration.verifier,
            "paymaster registered"
        );
        Ok(())
    }

    /// Removes the registration for `account` once it has expired.
    #[instrument(skip_all, err)]
    pub fn revoke_paymaster(
        &self,
        account: Address,
        now: UnixTimestamp,
    ) -> Result<Registration, LedgerError> {
        let removed = self.registry.revoke(account, now)?;
        tracing::info!(%account, paymaster = %removed.paymaster, "paymaster revoked");
        Ok(removed)
    }

    /// Looks up the registration for `account`, expired or not.
    pub fn registration(&self, account: Address) -> Option<Registration> {
        self.registry.get(account)
    }

    /// Records a new invoice under `invoice_id`.
    ///
    /// Each id is recorded exactly once; a second record for the same id
    /// fails with [`LedgerError::AlreadyExists`] even if the fields match.
    #[instrument(skip_all, err)]
    pub fn create_invoice(
        &self,
        account: Address,
        nonce: U256,
        paymaster: Address,
        invoice_id: InvoiceId,
    ) -> Result<(), LedgerError> {
        match self.invoices.entry(invoice_id) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists(invoice_id)),
            Entry::Vacant(vacant) => {
                vacant.insert(Invoice {
                    account,
                    nonce,
                    paymaster,
                    created_on_chain_id: self.chain_id,
                    repaid: false,
                });
                tracing::info!(%invoice_id, %account, "invoice created");
                Ok(())
            }
        }
    }

    /// Looks up the stored record for an invoice.
    pub fn invoice(&self, invoice_id: InvoiceId) -> Option<Invoice> {
        self.invoices.get(&invoice_id).map(|record| record.clone())
    }

    /// Settles an invoice against a proof.
    ///
    /// Resolves the account's registered verifier, checks the proof, then
    /// withdraws every obligation naming this ledger's chain from the
    /// account's vaults to the paymaster. The repaid flag flips before the
    /// vault is called and is restored if the withdrawal fails.
    #[instrument(skip_all, err)]
    pub async fn repay(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> Result<Settlement, LedgerError> {
        if IN_SETTLEMENT.try_with(|_| ()).is_ok() {
            return Err(LedgerError::ReentrantCall);
        }
        IN_SETTLEMENT
            .scope((), self.repay_inner(invoice_id, details, proof))
            .await
    }

    async fn repay_inner(
        &self,
        invoice_id: InvoiceId,
        details: &InvoiceDetails,
        proof: &[u8],
    ) -> Result<Settlement, LedgerError> {
        let registration = self
            .registry
            .get(details.account)
            .ok_or(LedgerError::NoVerifier(details.account))?;
        let verifier = self
            .verifiers
            .get(&registration.verifier)
            .cloned()
            .ok_or(LedgerError::NoVerifier(details.account))?;

        // Fail fast before proof verification; the authoritative
        // at-most-once check runs under the entry lock below.
        {
            let record = self
                .invoices
                .get(&invoice_id)
                .ok_or(LedgerError::UnknownInvoice(invoice_id))?;
            if record.repaid {
                return Err(LedgerError::AlreadyRepaid(invoice_id));
            }
        }

        if !verifier.verify_invoice(invoice_id, details, proof).await {
            return Err(LedgerError::InvalidInvoice(invoice_id));
        }

        let matched: Vec<RepayTokenInfo> = details
            .repay_token_infos
            .iter()
            .filter(|repay| repay.chain_id == self.chain_id)
            .copied()
            .collect();
        let vaults: Vec<Address> = matched.iter().map(|repay| repay.vault).collect();
        let amounts: Vec<U256> = matched.iter().map(|repay| repay.amount).collect();

        {
            let mut record = self
                .invoices
                .get_mut(&invoice_id)
                .ok_or(LedgerError::UnknownInvoice(invoice_id))?;
            if record.repaid {
                return Err(LedgerError::AlreadyRepaid(invoice_id));
            }
            record.repaid = true;
        }

        if let Err(err) = self
            .vault
            .withdraw_sponsor_token(details.account, &vaults, &amounts, details.paymaster)
            .await
        {
            tracing::warn!(%invoice_id, %err, "vault withdrawal failed, restoring repaid flag");
            if let Some(mut record) = self.invoices.get_mut(&invoice_id) {
                record.repaid = false;
            }
            return Err(err.into());
        }

        tracing::info!(
            %invoice_id,
            recipient = %details.paymaster,
            tokens = matched.len(),
            "invoice repaid"
        );
        Ok(Settlement {
            invoice_id,
            recipient: details.paymaster,
            repaid: matched,
        })
    }

    /// Refunds unused sponsorship allowances: pays the listed vault
    /// amounts out to the account itself, no proof involved.
    ///
    /// Only the account's registered paymaster may trigger this; anyone
    /// else gets [`LedgerError::Unauthorized`]. The registration's expiry
    /// does not matter here, only the binding.
    #[instrument(skip_all, err)]
    pub async fn withdraw_to_account(
        &self,
        caller: Address,
        account: Address,
        vaults: &[Address],
        amounts: &[U256],
    ) -> Result<(), LedgerError> {
        if IN_SETTLEMENT.try_with(|_| ()).is_ok() {
            return Err(LedgerError::ReentrantCall);
        }
        IN_SETTLEMENT
            .scope((), async {
                let registration = self
                    .registry
                    .get(account)
                    .ok_or(RegistryError::NotRegistered(account))?;
                if registration.paymaster != caller {
                    return Err(LedgerError::Unauthorized { caller, account });
                }
                self.vault
                    .withdraw_sponsor_token(account, vaults, amounts, account)
                    .await?;
                tracing::info!(%account, %caller, vaults = vaults.len(), "refund withdrawal");
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, address};
    use async_trait::async_trait;
    use std::sync::{Mutex, OnceLock};

    use crate::vault::InMemoryVault;

    const TEST_ACCOUNT: Address = address!("0x1111111111111111111111111111111111111111");
    const TEST_PAYMASTER: Address = address!("0x2222222222222222222222222222222222222222");
    const TEST_VERIFIER: Address = address!("0x3333333333333333333333333333333333333333");
    const TEST_VAULT: Address = address!("0x4444444444444444444444444444444444444444");
    const FOREIGN_VAULT: Address = address!("0x5555555555555555555555555555555555555555");

    const HOME_CHAIN: u64 = 11155111;
    const SPONSOR_CHAIN: u64 = 84532;

    struct FixedVerdict(bool);

    #[async_trait]
    impl InvoiceVerifier for FixedVerdict {
        async fn verify_invoice(
            &self,
            _invoice_id: InvoiceId,
            _details: &InvoiceDetails,
            _proof: &[u8],
        ) -> bool {
            self.0
        }
    }

    fn create_test_ledger(verdict: bool, vault: Arc<dyn VaultWithdraw>) -> InvoiceLedger {
        let verifiers: HashMap<Address, Arc<dyn InvoiceVerifier>> =
            HashMap::from([(TEST_VERIFIER, Arc::new(FixedVerdict(verdict)) as _)]);
        InvoiceLedger::new(HOME_CHAIN, verifiers, vault)
    }

    fn register_test_account(ledger: &InvoiceLedger) {
        ledger
            .register_paymaster(
                TEST_ACCOUNT,
                Registration {
                    paymaster: TEST_PAYMASTER,
                    verifier: TEST_VERIFIER,
                    expiry: UnixTimestamp::from_secs(2_000_000_000),
                },
                UnixTimestamp::from_secs(1_000),
            )
            .unwrap();
    }

    fn create_test_details() -> InvoiceDetails {
        InvoiceDetails {
            account: TEST_ACCOUNT,
            paymaster: TEST_PAYMASTER,
            nonce: U256::from(7u64),
            sponsor_chain_id: SPONSOR_CHAIN,
            repay_token_infos: vec![
                RepayTokenInfo {
                    vault: TEST_VAULT,
                    amount: U256::from(500u64),
                    chain_id: HOME_CHAIN,
                },
                RepayTokenInfo {
                    vault: FOREIGN_VAULT,
                    amount: U256::from(900u64),
                    chain_id: SPONSOR_CHAIN,
                },
            ],
        }
    }

    fn create_recorded_invoice(ledger: &InvoiceLedger, details: &InvoiceDetails) -> InvoiceId {
        let invoice_id = details.id();
        ledger
            .create_invoice(details.account, details.nonce, details.paymaster, invoice_id)
            .unwrap();
        invoice_id
    }

    #[test]
    fn test_create_and_get_invoice() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let record = ledger.invoice(invoice_id).unwrap();
        assert_eq!(record.account, TEST_ACCOUNT);
        assert_eq!(record.paymaster, TEST_PAYMASTER);
        assert_eq!(record.created_on_chain_id, HOME_CHAIN);
        assert!(!record.repaid);
        assert!(ledger.invoice(InvoiceId(B256::ZERO)).is_none());
    }

    #[test]
    fn test_create_rejects_duplicate_id() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let result =
            ledger.create_invoice(details.account, details.nonce, details.paymaster, invoice_id);
        assert!(matches!(result, Err(LedgerError::AlreadyExists(id)) if id == invoice_id));
    }

    #[test]
    fn test_registration_errors_surface() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        register_test_account(&ledger);

        let duplicate = ledger.register_paymaster(
            TEST_ACCOUNT,
            Registration {
                paymaster: TEST_PAYMASTER,
                verifier: TEST_VERIFIER,
                expiry: UnixTimestamp::from_secs(2_000_000_000),
            },
            UnixTimestamp::from_secs(1_000),
        );
        assert!(matches!(
            duplicate,
            Err(LedgerError::Registry(RegistryError::AlreadyRegistered(_)))
        ));

        let early = ledger.revoke_paymaster(TEST_ACCOUNT, UnixTimestamp::from_secs(1_000));
        assert!(matches!(
            early,
            Err(LedgerError::Registry(RegistryError::NotYetExpired { .. }))
        ));
        assert!(ledger.registration(TEST_ACCOUNT).is_some());
    }

    #[tokio::test]
    async fn test_repay_moves_matched_funds() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(800u64));
        vault.deposit(TEST_ACCOUNT, FOREIGN_VAULT, U256::from(900u64));
        let ledger = create_test_ledger(true, vault.clone());
        register_test_account(&ledger);
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let settlement = ledger.repay(invoice_id, &details, b"proof").await.unwrap();
        assert_eq!(settlement.invoice_id, invoice_id);
        assert_eq!(settlement.recipient, TEST_PAYMASTER);
        assert_eq!(settlement.repaid, vec![details.repay_token_infos[0]]);

        // Only the obligation naming the home chain moved.
        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(300u64));
        assert_eq!(vault.balance(TEST_PAYMASTER, TEST_VAULT), U256::from(500u64));
        assert_eq!(vault.balance(TEST_ACCOUNT, FOREIGN_VAULT), U256::from(900u64));
        assert!(ledger.invoice(invoice_id).unwrap().repaid);
    }

    #[tokio::test]
    async fn test_repay_is_at_most_once() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(1_000u64));
        let ledger = create_test_ledger(true, vault);
        register_test_account(&ledger);
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        ledger.repay(invoice_id, &details, b"proof").await.unwrap();
        let again = ledger.repay(invoice_id, &details, b"proof").await;
        assert!(matches!(again, Err(LedgerError::AlreadyRepaid(id)) if id == invoice_id));
    }

    #[tokio::test]
    async fn test_repay_rejects_unknown_invoice() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        register_test_account(&ledger);
        let details = create_test_details();

        let result = ledger.repay(details.id(), &details, b"proof").await;
        assert!(matches!(result, Err(LedgerError::UnknownInvoice(_))));
    }

    #[tokio::test]
    async fn test_repay_rejects_failed_proof() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(1_000u64));
        let ledger = create_test_ledger(false, vault.clone());
        register_test_account(&ledger);
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let result = ledger.repay(invoice_id, &details, b"proof").await;
        assert!(matches!(result, Err(LedgerError::InvalidInvoice(id)) if id == invoice_id));
        assert!(!ledger.invoice(invoice_id).unwrap().repaid);
        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(1_000u64));
    }

    #[tokio::test]
    async fn test_repay_requires_registration() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let result = ledger.repay(invoice_id, &details, b"proof").await;
        assert!(matches!(
            result,
            Err(LedgerError::NoVerifier(account)) if account == TEST_ACCOUNT
        ));
    }

    #[tokio::test]
    async fn test_repay_requires_installed_verifier() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));
        ledger
            .register_paymaster(
                TEST_ACCOUNT,
                Registration {
                    paymaster: TEST_PAYMASTER,
                    // Registration names an implementation this ledger
                    // does not carry.
                    verifier: TEST_VAULT,
                    expiry: UnixTimestamp::from_secs(2_000_000_000),
                },
                UnixTimestamp::from_secs(1_000),
            )
            .unwrap();
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        let result = ledger.repay(invoice_id, &details, b"proof").await;
        assert!(matches!(result, Err(LedgerError::NoVerifier(_))));
    }

    #[tokio::test]
    async fn test_repay_restores_flag_on_vault_failure() {
        let vault = Arc::new(InMemoryVault::new());
        let ledger = create_test_ledger(true, vault.clone());
        register_test_account(&ledger);
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        // Nothing deposited, so the withdrawal is refused.
        let result = ledger.repay(invoice_id, &details, b"proof").await;
        assert!(matches!(result, Err(LedgerError::Vault(VaultError::Rejected(_)))));
        assert!(!ledger.invoice(invoice_id).unwrap().repaid);

        // After funding, the same settlement goes through.
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(500u64));
        ledger.repay(invoice_id, &details, b"proof").await.unwrap();
        assert!(ledger.invoice(invoice_id).unwrap().repaid);
    }

    #[tokio::test]
    async fn test_repay_with_only_foreign_obligations() {
        let vault = Arc::new(InMemoryVault::new());
        let ledger = create_test_ledger(true, vault.clone());
        register_test_account(&ledger);
        let mut details = create_test_details();
        details.repay_token_infos.remove(0);
        let invoice_id = create_recorded_invoice(&ledger, &details);

        // Nothing names this chain, so the settlement moves nothing but
        // still closes the invoice here.
        let settlement = ledger.repay(invoice_id, &details, b"proof").await.unwrap();
        assert!(settlement.repaid.is_empty());
        assert!(ledger.invoice(invoice_id).unwrap().repaid);
    }

    #[tokio::test]
    async fn test_withdraw_requires_registration() {
        let ledger = create_test_ledger(true, Arc::new(InMemoryVault::new()));

        let result = ledger
            .withdraw_to_account(TEST_PAYMASTER, TEST_ACCOUNT, &[TEST_VAULT], &[U256::from(1u64)])
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::Registry(RegistryError::NotRegistered(account)))
                if account == TEST_ACCOUNT
        ));
    }

    #[tokio::test]
    async fn test_withdraw_rejects_foreign_caller() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(700u64));
        let ledger = create_test_ledger(true, vault.clone());
        register_test_account(&ledger);

        let result = ledger
            .withdraw_to_account(
                TEST_VERIFIER,
                TEST_ACCOUNT,
                &[TEST_VAULT],
                &[U256::from(300u64)],
            )
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::Unauthorized { caller, account })
                if caller == TEST_VERIFIER && account == TEST_ACCOUNT
        ));
        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(700u64));
    }

    #[tokio::test]
    async fn test_withdraw_by_registered_paymaster() {
        let vault = Arc::new(InMemoryVault::new());
        vault.deposit(TEST_ACCOUNT, TEST_VAULT, U256::from(700u64));
        let ledger = create_test_ledger(true, vault.clone());
        register_test_account(&ledger);

        ledger
            .withdraw_to_account(
                TEST_PAYMASTER,
                TEST_ACCOUNT,
                &[TEST_VAULT],
                &[U256::from(300u64)],
            )
            .await
            .unwrap();
        // The payout lands back on the account itself.
        assert_eq!(vault.balance(TEST_ACCOUNT, TEST_VAULT), U256::from(700u64));

        let excessive = ledger
            .withdraw_to_account(
                TEST_PAYMASTER,
                TEST_ACCOUNT,
                &[TEST_VAULT],
                &[U256::from(800u64)],
            )
            .await;
        assert!(matches!(
            excessive,
            Err(LedgerError::Vault(VaultError::Rejected(_)))
        ));
    }

    struct ReentrantVault {
        ledger: OnceLock<Arc<InvoiceLedger>>,
        observed: Mutex<Option<LedgerError>>,
    }

    impl ReentrantVault {
        fn new() -> Self {
            Self {
                ledger: OnceLock::new(),
                observed: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VaultWithdraw for ReentrantVault {
        async fn withdraw_sponsor_token(
            &self,
            account: Address,
            vaults: &[Address],
            amounts: &[U256],
            recipient: Address,
        ) -> Result<(), VaultError> {
            let ledger = self.ledger.get().unwrap();
            let inner = ledger
                .withdraw_to_account(recipient, account, vaults, amounts)
                .await;
            *self.observed.lock().unwrap() = inner.err();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_settlement_refuses_reentrant_calls() {
        let vault = Arc::new(ReentrantVault::new());
        let ledger = Arc::new({
            let verifiers: HashMap<Address, Arc<dyn InvoiceVerifier>> =
                HashMap::from([(TEST_VERIFIER, Arc::new(FixedVerdict(true)) as _)]);
            InvoiceLedger::new(HOME_CHAIN, verifiers, vault.clone())
        });
        vault.ledger.set(ledger.clone()).ok().unwrap();
        register_test_account(&ledger);
        let details = create_test_details();
        let invoice_id = create_recorded_invoice(&ledger, &details);

        // The outer settlement succeeds; the nested call it triggered was
        // refused.
        ledger.repay(invoice_id, &details, b"proof").await.unwrap();
        let observed = vault.observed.lock().unwrap().take();
        assert!(matches!(observed, Some(LedgerError::ReentrantCall)));
    }
}
