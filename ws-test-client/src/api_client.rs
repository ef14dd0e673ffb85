use anyhow::Result;
use log::*;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Presence {
    pub user_id: i32,
    pub online: bool,
    pub connections: usize,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    pub async fn presence(&self, cookie: &str, user_id: i32) -> Result<Presence> {
        let url = format!("{}/presence/{}", self.base_url, user_id);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Cookie", cookie)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("GET {} failed with {}", url, response.status());
        }

        Ok(response.json::<ApiResponse<Presence>>().await?.data)
    }
}
