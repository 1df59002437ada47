//! Typed client for the custodial signing/broadcast service.
//!
//! One method per endpoint. Every method validates its inputs before any
//! network I/O — validation failures short-circuit with an error and never
//! reach the wire — and returns a typed result parsed from the JSON body.
//! The private key never leaves the service; this client only composes
//! requests and interprets responses.

use crate::client::{ApiConfig, HttpClient};
use crate::error::RpcError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tidepool_types::{
    address_to_puzzle_hash, is_valid_coin_id, Coin, HydratedCoin, Network, WireCoin,
};

// =============================================================================
// Response Types
// =============================================================================

/// `/health` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: u64,
}

/// `/keys` response: the signing identity bound to the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletKeys {
    pub address: String,
    pub master_public_key: String,
    pub puzzle_hash: String,
    pub synthetic_public_key: String,
}

/// A single coin spend within a spend bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoinSpend {
    pub coin: Coin,
    #[serde(alias = "puzzle_reveal")]
    pub puzzle_reveal: String,
    pub solution: String,
}

/// A (possibly signed) spend bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendBundle {
    #[serde(alias = "coin_spends")]
    pub coin_spends: Vec<CoinSpend>,
    #[serde(default, alias = "aggregated_signature")]
    pub aggregated_signature: String,
}

/// Broadcast acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastResult {
    pub transaction_id: String,
    pub status: String,
}

/// A payment leg: recipient address and amount in mojos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub address: String,
    pub amount: u64,
    #[serde(default)]
    pub memos: Vec<String>,
}

/// NFT identification for offer creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftOfferData {
    pub launcher_id: String,
    pub nft_coin_id: String,
}

/// XCH leg of a mixed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XchTransfer {
    pub address: String,
    pub amount: u64,
}

/// CAT leg of a mixed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatTransfer {
    pub address: String,
    pub asset_id: String,
    pub amount: u64,
}

/// NFT leg of a mixed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NftTransfer {
    pub address: String,
    pub launcher_id: String,
}

/// A mixed-asset transfer request (XCH/CAT/NFT in one submission).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferRequest {
    pub coin_ids: Vec<String>,
    #[serde(default)]
    pub xch_transfers: Vec<XchTransfer>,
    #[serde(default)]
    pub cat_transfers: Vec<CatTransfer>,
    #[serde(default)]
    pub nft_transfers: Vec<NftTransfer>,
    #[serde(default)]
    pub fee: u64,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SignResponse {
    signed_spend_bundle: SpendBundle,
}

#[derive(Deserialize)]
struct OfferCreateResponse {
    unsigned_offer_string: String,
}

#[derive(Deserialize)]
struct OfferSignResponse {
    signed_offer: String,
}

// =============================================================================
// Client
// =============================================================================

/// Typed async client for the custodial service.
pub struct CustodyClient {
    client: HttpClient,
    network: Network,
}

impl CustodyClient {
    /// Create a mainnet client with the given base URL.
    pub fn new(url: &str) -> Self {
        Self {
            client: HttpClient::new(url),
            network: Network::Mainnet,
        }
    }

    /// Create a client with full transport configuration.
    pub fn with_config(config: ApiConfig) -> Self {
        Self {
            client: HttpClient::with_config(config),
            network: Network::Mainnet,
        }
    }

    /// Select the network whose address prefix recipient input must carry.
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    pub fn url(&self) -> &str {
        self.client.url()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Install or clear the bearer token used for subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        self.client.set_token(token);
    }

    pub fn has_token(&self) -> bool {
        self.client.has_token()
    }

    /// Service liveness check (GET `/health`).
    pub async fn health(&self) -> Result<HealthStatus, RpcError> {
        let value = self.client.get("/health").await?;
        parse("/health", value)
    }

    /// Fetch the signing identity bound to the bearer token (GET `/keys`).
    pub async fn wallet_keys(&self) -> Result<WalletKeys, RpcError> {
        let value = self.client.get("/keys").await?;
        parse("/keys", value)
    }

    /// Fetch plain unspent coins for an address.
    pub async fn unspent_coins(&self, address: &str) -> Result<Vec<Coin>, RpcError> {
        self.validate_own_address(address)?;
        let endpoint = format!("/coins/unspent?address={}", address);
        let value = self.client.get(&endpoint).await?;
        let envelope: DataEnvelope<Vec<Coin>> = parse(&endpoint, value)?;
        Ok(envelope.data)
    }

    /// Fetch unspent coins annotated with driver info.
    pub async fn hydrated_coins(&self, address: &str) -> Result<Vec<HydratedCoin>, RpcError> {
        self.validate_own_address(address)?;
        let endpoint = format!("/coins/unspent/hydrated?address={}", address);
        let value = self.client.get(&endpoint).await?;
        let envelope: DataEnvelope<Vec<HydratedCoin>> = parse(&endpoint, value)?;
        Ok(envelope.data)
    }

    /// Have the service sign a spend bundle (POST `/spend_bundle/sign`).
    pub async fn sign_spend_bundle(
        &self,
        coin_spends: &[CoinSpend],
    ) -> Result<SpendBundle, RpcError> {
        if coin_spends.is_empty() {
            return Err(RpcError::Validation(
                "spend bundle must contain at least one coin spend".to_string(),
            ));
        }
        let body = json!({ "coin_spends": wire_coin_spends(coin_spends) });
        let value = self.client.post("/spend_bundle/sign", &body).await?;
        let resp: SignResponse = parse("/spend_bundle/sign", value)?;
        Ok(resp.signed_spend_bundle)
    }

    /// Compose and sign an XCH send (POST `/transactions/send_xch`).
    ///
    /// Recipient addresses are decoded to puzzle hashes here; this is the
    /// only gate against malformed recipients. The selected coins must
    /// cover payments plus fee.
    pub async fn send_xch(
        &self,
        payments: &[Payment],
        selected_coins: &[Coin],
        fee: u64,
    ) -> Result<SpendBundle, RpcError> {
        let body = self.send_xch_body(payments, selected_coins, fee)?;
        let value = self.client.post("/transactions/send_xch", &body).await?;
        let resp: SignResponse = parse("/transactions/send_xch", value)?;
        Ok(resp.signed_spend_bundle)
    }

    /// Broadcast a signed spend bundle (POST `/transactions/broadcast`).
    pub async fn broadcast(&self, bundle: &SpendBundle) -> Result<BroadcastResult, RpcError> {
        if bundle.coin_spends.is_empty() {
            return Err(RpcError::Validation(
                "cannot broadcast an empty spend bundle".to_string(),
            ));
        }
        if bundle.aggregated_signature.is_empty() {
            return Err(RpcError::Validation(
                "cannot broadcast an unsigned spend bundle".to_string(),
            ));
        }
        let body = json!({
            "coin_spends": wire_coin_spends(&bundle.coin_spends),
            "aggregated_signature": bundle.aggregated_signature,
        });
        let value = self.client.post("/transactions/broadcast", &body).await?;
        parse("/transactions/broadcast", value)
    }

    /// Sign then broadcast an XCH send as a strict two-step sequence.
    ///
    /// If signing fails, no broadcast is attempted; the error's endpoint
    /// context (`/transactions/send_xch` vs `/transactions/broadcast`)
    /// identifies which step failed.
    pub async fn send_and_broadcast_xch(
        &self,
        payments: &[Payment],
        selected_coins: &[Coin],
        fee: u64,
    ) -> Result<BroadcastResult, RpcError> {
        let signed = self.send_xch(payments, selected_coins, fee).await?;
        self.broadcast(&signed).await
    }

    /// Create an unsigned NFT offer (POST `/offers/create`).
    pub async fn make_nft_offer(
        &self,
        requested_payments: &[Payment],
        nft: &NftOfferData,
    ) -> Result<String, RpcError> {
        if requested_payments.is_empty() {
            return Err(RpcError::Validation(
                "offer must request at least one payment".to_string(),
            ));
        }
        for payment in requested_payments {
            self.validate_payment(payment)?;
        }
        if !is_valid_coin_id(&nft.launcher_id) {
            return Err(RpcError::Validation(format!(
                "invalid NFT launcher id: {:?}",
                nft.launcher_id
            )));
        }
        if !is_valid_coin_id(&nft.nft_coin_id) {
            return Err(RpcError::Validation(format!(
                "invalid NFT coin id: {:?}",
                nft.nft_coin_id
            )));
        }
        let wire_payments = requested_payments
            .iter()
            .map(|p| self.wire_payment(p))
            .collect::<Result<Vec<_>, RpcError>>()?;
        let body = json!({
            "requested_payments": wire_payments,
            "nft_data": { "launcher_id": nft.launcher_id, "nft_coin_id": nft.nft_coin_id },
        });
        let value = self.client.post("/offers/create", &body).await?;
        let resp: OfferCreateResponse = parse("/offers/create", value)?;
        Ok(resp.unsigned_offer_string)
    }

    /// Sign an offer string (POST `/offers/sign`).
    pub async fn sign_offer(&self, offer: &str) -> Result<String, RpcError> {
        if offer.trim().is_empty() {
            return Err(RpcError::Validation("offer string is empty".to_string()));
        }
        let body = json!({ "offer": offer });
        let value = self.client.post("/offers/sign", &body).await?;
        let resp: OfferSignResponse = parse("/offers/sign", value)?;
        Ok(resp.signed_offer)
    }

    /// Submit a mixed-asset transfer (POST `/transfers`).
    pub async fn transfer_assets(
        &self,
        request: &TransferRequest,
    ) -> Result<BroadcastResult, RpcError> {
        self.validate_transfer(request)?;
        let body = serde_json::to_value(request).map_err(|e| RpcError::Json {
            endpoint: "/transfers".to_string(),
            detail: e.to_string(),
        })?;
        let value = self.client.post("/transfers", &body).await?;
        parse("/transfers", value)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    fn validate_own_address(&self, address: &str) -> Result<(), RpcError> {
        if address.trim().is_empty() {
            return Err(RpcError::Validation("address is empty".to_string()));
        }
        address_to_puzzle_hash(address, self.network.address_prefix())?;
        Ok(())
    }

    fn validate_payment(&self, payment: &Payment) -> Result<(), RpcError> {
        if payment.amount == 0 {
            return Err(RpcError::Validation(format!(
                "payment to {} has zero amount",
                payment.address
            )));
        }
        address_to_puzzle_hash(&payment.address, self.network.address_prefix())?;
        Ok(())
    }

    fn wire_payment(&self, payment: &Payment) -> Result<Value, RpcError> {
        let puzzle_hash =
            address_to_puzzle_hash(&payment.address, self.network.address_prefix())?;
        Ok(json!({
            "puzzle_hash": puzzle_hash,
            "amount": payment.amount,
            "memos": payment.memos,
        }))
    }

    fn send_xch_body(
        &self,
        payments: &[Payment],
        selected_coins: &[Coin],
        fee: u64,
    ) -> Result<Value, RpcError> {
        if payments.is_empty() {
            return Err(RpcError::Validation(
                "at least one payment is required".to_string(),
            ));
        }
        if selected_coins.is_empty() {
            return Err(RpcError::Validation(
                "at least one coin must be selected".to_string(),
            ));
        }

        let mut wire_payments = Vec::with_capacity(payments.len());
        let mut required: u128 = fee as u128;
        for payment in payments {
            self.validate_payment(payment)?;
            wire_payments.push(self.wire_payment(payment)?);
            required += payment.amount as u128;
        }

        let mut available: u128 = 0;
        for coin in selected_coins {
            available += coin.amount_mojos()?;
        }
        if available < required {
            return Err(RpcError::InsufficientBalance {
                required,
                available,
            });
        }

        Ok(json!({
            "payments": wire_payments,
            "selected_coins": selected_coins.iter().map(WireCoin::from).collect::<Vec<_>>(),
            "fee": fee,
        }))
    }

    fn validate_transfer(&self, request: &TransferRequest) -> Result<(), RpcError> {
        if request.coin_ids.is_empty() {
            return Err(RpcError::Validation(
                "transfer requires at least one coin id".to_string(),
            ));
        }
        for id in &request.coin_ids {
            if !is_valid_coin_id(id) {
                return Err(RpcError::Validation(format!("invalid coin id: {:?}", id)));
            }
        }
        if request.xch_transfers.is_empty()
            && request.cat_transfers.is_empty()
            && request.nft_transfers.is_empty()
        {
            return Err(RpcError::Validation(
                "transfer has no XCH, CAT, or NFT legs".to_string(),
            ));
        }

        let prefix = self.network.address_prefix();
        for leg in &request.xch_transfers {
            if leg.amount == 0 {
                return Err(RpcError::Validation(format!(
                    "XCH transfer to {} has zero amount",
                    leg.address
                )));
            }
            address_to_puzzle_hash(&leg.address, prefix)?;
        }
        for leg in &request.cat_transfers {
            if leg.amount == 0 {
                return Err(RpcError::Validation(format!(
                    "CAT transfer to {} has zero amount",
                    leg.address
                )));
            }
            if !is_valid_coin_id(&leg.asset_id) {
                return Err(RpcError::Validation(format!(
                    "invalid CAT asset id: {:?}",
                    leg.asset_id
                )));
            }
            address_to_puzzle_hash(&leg.address, prefix)?;
        }
        for leg in &request.nft_transfers {
            if !is_valid_coin_id(&leg.launcher_id) {
                return Err(RpcError::Validation(format!(
                    "invalid NFT launcher id: {:?}",
                    leg.launcher_id
                )));
            }
            address_to_puzzle_hash(&leg.address, prefix)?;
        }
        Ok(())
    }
}

fn parse<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::Json {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })
}

fn wire_coin_spends(spends: &[CoinSpend]) -> Vec<Value> {
    spends
        .iter()
        .map(|spend| {
            json!({
                "coin": WireCoin::from(&spend.coin),
                "puzzle_reveal": spend.puzzle_reveal,
                "solution": spend.solution,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const XCH_ADDR: &str =
        "xch1424242424242424242424242424242424242424242424242424q48w9sf";

    // Validation failures must short-circuit, so a black-hole URL is safe.
    fn client() -> CustodyClient {
        CustodyClient::with_config(ApiConfig {
            url: "http://127.0.0.1:1".to_string(),
            retries: 0,
            ..Default::default()
        })
    }

    fn coin(amount: &str) -> Coin {
        Coin::new("aa".repeat(32), "bb".repeat(32), amount)
    }

    fn payment(amount: u64) -> Payment {
        Payment {
            address: XCH_ADDR.to_string(),
            amount,
            memos: vec![],
        }
    }

    #[test]
    fn test_send_xch_body_converts_addresses() {
        let body = client()
            .send_xch_body(&[payment(1000)], &[coin("5000")], 100)
            .unwrap();
        assert_eq!(body["fee"], 100);
        assert_eq!(body["payments"][0]["puzzle_hash"], "aa".repeat(32));
        assert_eq!(body["payments"][0]["amount"], 1000);
        // Selected coins go out in snake_case wire form.
        assert_eq!(
            body["selected_coins"][0]["parent_coin_info"],
            "aa".repeat(32)
        );
        assert!(body["selected_coins"][0].get("parentCoinInfo").is_none());
    }

    #[test]
    fn test_send_xch_rejects_empty_inputs() {
        let c = client();
        assert!(matches!(
            c.send_xch_body(&[], &[coin("5000")], 0),
            Err(RpcError::Validation(_))
        ));
        assert!(matches!(
            c.send_xch_body(&[payment(1000)], &[], 0),
            Err(RpcError::Validation(_))
        ));
        assert!(matches!(
            c.send_xch_body(&[payment(0)], &[coin("5000")], 0),
            Err(RpcError::Validation(_))
        ));
    }

    #[test]
    fn test_send_xch_rejects_bad_address() {
        let c = client();
        let bad = Payment {
            address: "not-a-valid-address".to_string(),
            amount: 1000,
            memos: vec![],
        };
        assert!(matches!(
            c.send_xch_body(&[bad], &[coin("5000")], 0),
            Err(RpcError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_send_xch_insufficient_balance() {
        let c = client();
        let err = c
            .send_xch_body(&[payment(1000)], &[coin("900")], 200)
            .unwrap_err();
        match err {
            RpcError::InsufficientBalance {
                required,
                available,
            } => {
                assert_eq!(required, 1200);
                assert_eq!(available, 900);
            }
            other => panic!("expected InsufficientBalance, got {}", other),
        }
    }

    #[test]
    fn test_send_xch_exact_balance_ok() {
        let body = client().send_xch_body(&[payment(1000)], &[coin("1200")], 200);
        assert!(body.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_rejects_unsigned_bundle() {
        let c = client();
        let bundle = SpendBundle {
            coin_spends: vec![CoinSpend {
                coin: coin("1"),
                puzzle_reveal: "ff".to_string(),
                solution: "80".to_string(),
            }],
            aggregated_signature: String::new(),
        };
        assert!(matches!(
            c.broadcast(&bundle).await,
            Err(RpcError::Validation(_))
        ));

        let empty = SpendBundle {
            coin_spends: vec![],
            aggregated_signature: "c0".repeat(48),
        };
        assert!(matches!(
            c.broadcast(&empty).await,
            Err(RpcError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_spend_bundle_rejects_empty() {
        assert!(matches!(
            client().sign_spend_bundle(&[]).await,
            Err(RpcError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_coin_fetch_rejects_bad_address() {
        let c = client();
        assert!(matches!(
            c.hydrated_coins("").await,
            Err(RpcError::Validation(_))
        ));
        assert!(matches!(
            c.unspent_coins("garbage").await,
            Err(RpcError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let c = client();

        let empty = TransferRequest::default();
        assert!(matches!(
            c.transfer_assets(&empty).await,
            Err(RpcError::Validation(_))
        ));

        let bad_id = TransferRequest {
            coin_ids: vec!["nope".to_string()],
            xch_transfers: vec![XchTransfer {
                address: XCH_ADDR.to_string(),
                amount: 1,
            }],
            ..Default::default()
        };
        assert!(matches!(
            c.transfer_assets(&bad_id).await,
            Err(RpcError::Validation(_))
        ));

        let no_legs = TransferRequest {
            coin_ids: vec!["aa".repeat(32)],
            ..Default::default()
        };
        assert!(matches!(
            c.transfer_assets(&no_legs).await,
            Err(RpcError::Validation(_))
        ));

        let bad_asset = TransferRequest {
            coin_ids: vec!["aa".repeat(32)],
            cat_transfers: vec![CatTransfer {
                address: XCH_ADDR.to_string(),
                asset_id: "short".to_string(),
                amount: 5,
            }],
            ..Default::default()
        };
        assert!(matches!(
            c.transfer_assets(&bad_asset).await,
            Err(RpcError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_offer_validation() {
        let c = client();
        let nft = NftOfferData {
            launcher_id: "ee".repeat(32),
            nft_coin_id: "ff".repeat(32),
        };
        assert!(matches!(
            c.make_nft_offer(&[], &nft).await,
            Err(RpcError::Validation(_))
        ));

        let bad_nft = NftOfferData {
            launcher_id: "xyz".to_string(),
            nft_coin_id: "ff".repeat(32),
        };
        assert!(matches!(
            c.make_nft_offer(&[payment(1)], &bad_nft).await,
            Err(RpcError::Validation(_))
        ));

        assert!(matches!(
            c.sign_offer("   ").await,
            Err(RpcError::Validation(_))
        ));
    }

    #[test]
    fn test_spend_bundle_wire_deserialization() {
        let wire = serde_json::json!({
            "coin_spends": [{
                "coin": {
                    "parent_coin_info": "aa".repeat(32),
                    "puzzle_hash": "bb".repeat(32),
                    "amount": "1000"
                },
                "puzzle_reveal": "ff",
                "solution": "80"
            }],
            "aggregated_signature": "c0".repeat(48)
        });
        let bundle: SpendBundle = serde_json::from_value(wire).unwrap();
        assert_eq!(bundle.coin_spends.len(), 1);
        assert_eq!(bundle.coin_spends[0].coin.amount, "1000");
    }
}
