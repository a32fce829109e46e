// Buy/sell profiles keyed by signal source identity
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ProfileDefaults;
use crate::db::ProfileStore;
use crate::error::EngineError;
use crate::models::{BuyPolicy, Platform, Profile, SellPolicy};
use crate::Result;

pub struct ProfileManager {
    store: Arc<dyn ProfileStore>,
    defaults: ProfileDefaults,
}

impl ProfileManager {
    pub fn new(store: Arc<dyn ProfileStore>, defaults: ProfileDefaults) -> Self {
        Self { store, defaults }
    }

    /// Create an active profile with the configured default policies
    ///
    /// Adding an identity that already has a profile leaves it unchanged.
    pub async fn add_profile(&self, platform: Platform, username: &str) -> Result<Uuid> {
        if let Some(existing) = self.store.get_profile(platform, username).await? {
            tracing::info!("Profile for {} ({}) already exists", username, platform);
            return Ok(existing.id);
        }

        let profile = Profile::new(
            platform,
            username,
            self.defaults.auto_buy.clone(),
            self.defaults.auto_sell.clone(),
        );
        self.store.save_profile(&profile).await?;

        tracing::info!("👤 Added profile {} for {} ({})", profile.id, username, platform);
        Ok(profile.id)
    }

    pub async fn activate_profile(&self, id: Uuid) -> Result<()> {
        self.set_active(id, true).await
    }

    pub async fn deactivate_profile(&self, id: Uuid) -> Result<()> {
        self.set_active(id, false).await
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> Result<()> {
        let mut profile = self.get_profile_by_id(id).await?;
        profile.is_active = is_active;
        self.store.save_profile(&profile).await
    }

    /// Replace both policies of an existing profile
    pub async fn update_profile(&self, id: Uuid, buy: BuyPolicy, sell: SellPolicy) -> Result<()> {
        let mut profile = self.get_profile_by_id(id).await?;
        profile.buy = buy;
        profile.sell = sell;
        self.store.save_profile(&profile).await
    }

    pub async fn get_profile(&self, platform: Platform, username: &str) -> Result<Option<Profile>> {
        self.store.get_profile(platform, username).await
    }

    pub async fn get_profile_by_id(&self, id: Uuid) -> Result<Profile> {
        self.store
            .get_profile_by_id(id)
            .await?
            .ok_or(EngineError::UnknownProfile(id))
    }

    pub async fn get_profiles(&self) -> Result<Vec<Profile>> {
        self.store.get_profiles().await
    }

    pub async fn delete_profile(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_profile(id).await? {
            return Err(EngineError::UnknownProfile(id));
        }
        tracing::info!("Deleted profile {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::MemoryStore;
    use crate::models::{AmountType, Currency, SellMode};

    fn manager() -> ProfileManager {
        ProfileManager::new(Arc::new(MemoryStore::new()), Settings::default().defaults)
    }

    #[tokio::test]
    async fn test_add_profile_uses_defaults() {
        let profiles = manager();
        let id = profiles.add_profile(Platform::Twitter, "alpha").await.unwrap();

        assert_eq!(id, Profile::id_for(Platform::Twitter, "alpha"));

        let profile = profiles.get_profile_by_id(id).await.unwrap();
        assert!(profile.is_active);
        assert_eq!(profile.buy, Settings::default().defaults.auto_buy);
        assert_eq!(profile.sell, Settings::default().defaults.auto_sell);
    }

    #[tokio::test]
    async fn test_add_profile_is_idempotent() {
        let profiles = manager();
        let id = profiles.add_profile(Platform::Twitter, "alpha").await.unwrap();
        profiles.deactivate_profile(id).await.unwrap();

        let again = profiles.add_profile(Platform::Twitter, "alpha").await.unwrap();

        assert_eq!(again, id);
        assert!(!profiles.get_profile_by_id(id).await.unwrap().is_active);
        assert_eq!(profiles.get_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_activate_and_update() {
        let profiles = manager();
        let id = profiles.add_profile(Platform::Twitter, "alpha").await.unwrap();

        profiles.deactivate_profile(id).await.unwrap();
        profiles.activate_profile(id).await.unwrap();

        let buy = BuyPolicy {
            buy_type: Currency::Usdc,
            amount_type: AmountType::Amount,
            amount: 25.0,
            slippage: 300,
        };
        let sell = SellPolicy {
            sell_mode: SellMode::TimeBased,
            sell_type: Currency::Sol,
            sell_value: 60.0,
            slippage: 300,
        };
        profiles.update_profile(id, buy.clone(), sell.clone()).await.unwrap();

        let profile = profiles
            .get_profile(Platform::Twitter, "alpha")
            .await
            .unwrap()
            .unwrap();
        assert!(profile.is_active);
        assert_eq!(profile.buy, buy);
        assert_eq!(profile.sell, sell);
    }

    #[tokio::test]
    async fn test_unknown_profile_errors() {
        let profiles = manager();
        let id = Uuid::new_v4();

        assert!(matches!(
            profiles.activate_profile(id).await,
            Err(EngineError::UnknownProfile(_))
        ));
        assert!(matches!(
            profiles.delete_profile(id).await,
            Err(EngineError::UnknownProfile(_))
        ));
    }
}
