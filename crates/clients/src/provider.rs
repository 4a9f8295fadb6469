//! Alloy provider construction shared by the L1 clients.

use std::str::FromStr;

use alloy::{
    network::EthereumWallet,
    providers::{DynProvider, Provider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_primitives::Address;

use crate::errors::ChainError;

fn parse_url(url: &str) -> Result<Url, ChainError> {
    Url::parse(url).map_err(|e| ChainError::network(format!("invalid url {url}: {e}")))
}

/// Read-only provider for an L1 execution endpoint.
pub fn http_provider(url: &str) -> Result<DynProvider, ChainError> {
    Ok(ProviderBuilder::new().connect_http(parse_url(url)?).erased())
}

/// Provider that signs and fills transactions with `private_key`.
///
/// Returns the signer address alongside it.
pub fn signing_provider(url: &str, private_key: &str) -> Result<(DynProvider, Address), ChainError> {
    let signer = PrivateKeySigner::from_str(private_key.trim())
        .map_err(|e| ChainError::Decode(format!("invalid signer key: {e}")))?;
    let address = signer.address();
    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(parse_url(url)?)
        .erased();
    Ok((provider, address))
}
