//! Account registration registry.
//!
//! Maps an account to the single [`Registration`] that names which
//! paymaster may sponsor for it and which verifier implementation settles
//! its invoices. Registrations are append-only while live: a second
//! registration is refused until the first expires, and revocation is only
//! possible after expiry. Replacing an expired registration is allowed
//! without revoking it first.

use alloy_primitives::Address;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use cab_types::registration::Registration;
use cab_types::timestamp::UnixTimestamp;

/// Errors from registering or revoking an account registration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The account already holds a registration that has not expired.
    #[error("account {0} already holds a live registration")]
    AlreadyRegistered(Address),
    /// The account holds no registration at all.
    #[error("account {0} holds no registration")]
    NotRegistered(Address),
    /// The registration is still live and cannot be revoked yet.
    #[error("registration for account {account} is live until {expiry}")]
    NotYetExpired {
        account: Address,
        expiry: UnixTimestamp,
    },
    /// The requested expiry is not in the future.
    #[error("registration expiry {expiry} is not after {now}")]
    InvalidExpiry {
        expiry: UnixTimestamp,
        now: UnixTimestamp,
    },
}

/// Concurrent account-to-registration table.
///
/// All checks run under the per-account entry lock, so two racing
/// registrations for the same account serialize and exactly one wins.
#[derive(Debug, Default)]
pub struct RegistrationRegistry {
    entries: DashMap<Address, Registration>,
}

impl RegistrationRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Installs a registration for `account`.
    ///
    /// The expiry must lie strictly in the future. Fails with
    /// [`RegistryError::AlreadyRegistered`] while a live registration is in
    /// place; an expired leftover is silently replaced.
    pub fn register(
        &self,
        account: Address,
        registration: Registration,
        now: UnixTimestamp,
    ) -> Result<(), RegistryError> {
        if registration.expiry <= now {
            return Err(RegistryError::InvalidExpiry {
                expiry: registration.expiry,
                now,
            });
        }
        match self.entries.entry(account) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expired(now) {
                    occupied.insert(registration);
                    Ok(())
                } else {
                    Err(RegistryError::AlreadyRegistered(account))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(registration);
                Ok(())
            }
        }
    }

    /// Removes the registration for `account` once it has expired.
    ///
    /// Returns the removed registration. A live registration cannot be
    /// revoked; wait out the expiry instead.
    pub fn revoke(
        &self,
        account: Address,
        now: UnixTimestamp,
    ) -> Result<Registration, RegistryError> {
        match self.entries.entry(account) {
            Entry::Occupied(occupied) => {
                let registration = *occupied.get();
                if registration.expired(now) {
                    occupied.remove();
                    Ok(registration)
                } else {
                    Err(RegistryError::NotYetExpired {
                        account,
                        expiry: registration.expiry,
                    })
                }
            }
            Entry::Vacant(_) => Err(RegistryError::NotRegistered(account)),
        }
    }

    /// Looks up the registration for `account`, expired or not.
    pub fn get(&self, account: Address) -> Option<Registration> {
        self.entries.get(&account).map(|entry| *entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const TEST_ACCOUNT: Address = address!("0x1010101010101010101010101010101010101010");
    const TEST_PAYMASTER: Address = address!("0x2020202020202020202020202020202020202020");
    const TEST_VERIFIER: Address = address!("0x3030303030303030303030303030303030303030");

    fn create_test_registration(expiry: u64) -> Registration {
        Registration {
            paymaster: TEST_PAYMASTER,
            verifier: TEST_VERIFIER,
            expiry: UnixTimestamp::from_secs(expiry),
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = RegistrationRegistry::new();
        let now = UnixTimestamp::from_secs(1_000);
        registry
            .register(TEST_ACCOUNT, create_test_registration(2_000), now)
            .unwrap();
        let stored = registry.get(TEST_ACCOUNT).unwrap();
        assert_eq!(stored.paymaster, TEST_PAYMASTER);
        assert_eq!(stored.verifier, TEST_VERIFIER);
        assert!(registry.get(TEST_PAYMASTER).is_none());
    }

    #[test]
    fn test_register_rejects_live_duplicate() {
        let registry = RegistrationRegistry::new();
        let now = UnixTimestamp::from_secs(1_000);
        registry
            .register(TEST_ACCOUNT, create_test_registration(2_000), now)
            .unwrap();
        let result = registry.register(TEST_ACCOUNT, create_test_registration(3_000), now);
        assert_eq!(result, Err(RegistryError::AlreadyRegistered(TEST_ACCOUNT)));
    }

    #[test]
    fn test_register_replaces_expired_leftover() {
        let registry = RegistrationRegistry::new();
        registry
            .register(
                TEST_ACCOUNT,
                create_test_registration(2_000),
                UnixTimestamp::from_secs(1_000),
            )
            .unwrap();
        // At the expiry instant the old registration is already dead.
        let later = UnixTimestamp::from_secs(2_000);
        registry
            .register(TEST_ACCOUNT, create_test_registration(5_000), later)
            .unwrap();
        let stored = registry.get(TEST_ACCOUNT).unwrap();
        assert_eq!(stored.expiry, UnixTimestamp::from_secs(5_000));
    }

    #[test]
    fn test_register_rejects_past_expiry() {
        let registry = RegistrationRegistry::new();
        let now = UnixTimestamp::from_secs(1_000);
        for expiry in [999, 1_000] {
            let result = registry.register(TEST_ACCOUNT, create_test_registration(expiry), now);
            assert_eq!(
                result,
                Err(RegistryError::InvalidExpiry {
                    expiry: UnixTimestamp::from_secs(expiry),
                    now,
                })
            );
        }
        assert!(registry.get(TEST_ACCOUNT).is_none());
    }

    #[test]
    fn test_revoke_requires_expiry() {
        let registry = RegistrationRegistry::new();
        let now = UnixTimestamp::from_secs(1_000);
        registry
            .register(TEST_ACCOUNT, create_test_registration(2_000), now)
            .unwrap();
        let early = registry.revoke(TEST_ACCOUNT, UnixTimestamp::from_secs(1_999));
        assert_eq!(
            early,
            Err(RegistryError::NotYetExpired {
                account: TEST_ACCOUNT,
                expiry: UnixTimestamp::from_secs(2_000),
            })
        );
        let removed = registry
            .revoke(TEST_ACCOUNT, UnixTimestamp::from_secs(2_000))
            .unwrap();
        assert_eq!(removed.paymaster, TEST_PAYMASTER);
        assert!(registry.get(TEST_ACCOUNT).is_none());
    }

    #[test]
    fn test_revoke_unknown_account() {
        let registry = RegistrationRegistry::new();
        let result = registry.revoke(TEST_ACCOUNT, UnixTimestamp::from_secs(1_000));
        assert_eq!(result, Err(RegistryError::NotRegistered(TEST_ACCOUNT)));
    }
}
