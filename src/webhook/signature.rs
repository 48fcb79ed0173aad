use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

// 签名头格式：`t=<unix_ts>,v1=<hex>[,v1=<hex>...]`
// 签名载荷为 `{t}.{raw_body}`，HMAC-SHA256，十六进制编码。
// 任一 v1 候选匹配即通过（密钥轮换期间支付方会带多个签名）。
pub fn verify_signature(payload: &str, header: &str, secret: &str) -> Result<(), AppError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = Some(value),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let Some(t) = timestamp else {
        return Err(AppError::Validation("invalid webhook signature".into()));
    };
    if candidates.is_empty() {
        return Err(AppError::Validation("invalid webhook signature".into()));
    }

    let signed_payload = format!("{}.{}", t, payload);
    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AppError::Config(format!("webhook secret error: {}", e)))?;
        mac.update(signed_payload.as_bytes());
        // verify_slice 为常数时间比较
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(AppError::Validation("invalid webhook signature".into()))
}

// 测试与联调用：按同一方案生成签名头
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, payload);
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    let sig = hex::encode(mac.finalize().into_bytes());
    format!("t={},v1={}", timestamp, sig)
}
