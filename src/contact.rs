use crate::account::Accounts;
use crate::error::MarketError;
use crate::models::User;

/// Owner of a listing together with the message being drafted to them
#[derive(Debug, Clone, PartialEq)]
pub struct ContactDraft {
    pub owner: User,
    pub listing_name: String,
    pub message: String,
}

impl ContactDraft {
    /// Look up the listing owner's profile
    pub async fn for_owner(
        accounts: &Accounts,
        owner_id: &str,
        listing_name: &str,
    ) -> Result<Self, MarketError> {
        let owner = accounts.fetch_user(owner_id).await?;
        Ok(Self {
            owner,
            listing_name: listing_name.to_string(),
            message: String::new(),
        })
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// `mailto:` link with the listing name as subject and the message as body
    pub fn mailto(&self) -> String {
        format!(
            "mailto:{}?Subject={}&body={}",
            self.owner.email,
            urlencoding::encode(&self.listing_name),
            urlencoding::encode(&self.message)
        )
    }
}
