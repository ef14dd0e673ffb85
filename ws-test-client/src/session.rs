use anyhow::{Context, Result};

/// A user the client acts as: their id and a live session token, as printed by `seed_db`.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i32,
    pub token: String,
}

impl SessionUser {
    /// Parses `ID:TOKEN`.
    pub fn parse(s: &str) -> Result<Self> {
        let (user_id, token) = s
            .split_once(':')
            .context("Expected user in the form ID:TOKEN")?;
        let user_id = user_id
            .trim()
            .parse()
            .with_context(|| format!("Invalid user id {user_id:?}"))?;
        let token = token.trim();
        anyhow::ensure!(!token.is_empty(), "Session token must not be empty");

        Ok(Self {
            user_id,
            token: token.to_string(),
        })
    }

    pub fn cookie(&self, cookie_name: &str) -> String {
        format!("{}={}", cookie_name, self.token)
    }
}
