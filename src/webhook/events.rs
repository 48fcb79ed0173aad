use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::AppError;
use crate::subscription::SubscriptionStatus;

// 支付方事件信封解析后的本地表示。
// 未识别的事件类型归入 Other，由调度层记日志后确认。
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    SubscriptionUpserted {
        user_id: String,
        processor_subscription_id: String,
        plan_id: String,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
        cancel_at_period_end: bool,
    },
    SubscriptionDeleted {
        user_id: String,
    },
    CheckoutCompleted {
        user_id: String,
        customer_id: String,
    },
    InvoicePaymentSucceeded {
        customer_id: String,
        amount_paid: i64,
        currency: String,
    },
    InvoicePaymentFailed {
        customer_id: String,
        amount_due: i64,
        currency: String,
    },
    IntentSucceeded {
        intent_id: String,
    },
    IntentFailed {
        intent_id: String,
    },
    Other {
        event_type: String,
    },
}

fn object(envelope: &Value) -> Result<&Value, AppError> {
    envelope
        .pointer("/data/object")
        .ok_or_else(|| AppError::Validation("event missing data.object".into()))
}

fn required_str(obj: &Value, key: &str, what: &str) -> Result<String, AppError> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation(format!("event missing {}", what)))
}

fn metadata_user_id(obj: &Value) -> Result<String, AppError> {
    obj.pointer("/metadata/userId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("event missing metadata.userId".into()))
}

fn plan_id(obj: &Value) -> String {
    obj.pointer("/plan/id")
        .or_else(|| obj.pointer("/items/data/0/price/id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

fn period_end(obj: &Value) -> Option<DateTime<Utc>> {
    obj.get("current_period_end")
        .and_then(Value::as_i64)
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

pub fn parse_event(envelope: &Value) -> Result<WebhookEvent, AppError> {
    let event_type = envelope
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("event missing type".into()))?;

    match event_type {
        "customer.subscription.created" | "customer.subscription.updated" => {
            let obj = object(envelope)?;
            let raw_status = required_str(obj, "status", "subscription status")?;
            let status = SubscriptionStatus::parse(&raw_status).ok_or_else(|| {
                AppError::Validation(format!("unknown subscription status `{}`", raw_status))
            })?;
            Ok(WebhookEvent::SubscriptionUpserted {
                user_id: metadata_user_id(obj)?,
                processor_subscription_id: required_str(obj, "id", "subscription id")?,
                plan_id: plan_id(obj),
                status,
                current_period_end: period_end(obj),
                cancel_at_period_end: obj
                    .get("cancel_at_period_end")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        "customer.subscription.deleted" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::SubscriptionDeleted {
                user_id: metadata_user_id(obj)?,
            })
        }
        // 用户与支付方 customer 的映射在这里第一次可知
        "checkout.session.completed" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::CheckoutCompleted {
                user_id: metadata_user_id(obj)?,
                customer_id: required_str(obj, "customer", "session customer")?,
            })
        }
        "invoice.payment_succeeded" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::InvoicePaymentSucceeded {
                customer_id: required_str(obj, "customer", "invoice customer")?,
                amount_paid: obj.get("amount_paid").and_then(Value::as_i64).unwrap_or(0),
                currency: obj
                    .get("currency")
                    .and_then(Value::as_str)
                    .unwrap_or("usd")
                    .to_string(),
            })
        }
        "invoice.payment_failed" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::InvoicePaymentFailed {
                customer_id: required_str(obj, "customer", "invoice customer")?,
                amount_due: obj.get("amount_due").and_then(Value::as_i64).unwrap_or(0),
                currency: obj
                    .get("currency")
                    .and_then(Value::as_str)
                    .unwrap_or("usd")
                    .to_string(),
            })
        }
        "payment_intent.succeeded" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::IntentSucceeded {
                intent_id: required_str(obj, "id", "intent id")?,
            })
        }
        "payment_intent.payment_failed" => {
            let obj = object(envelope)?;
            Ok(WebhookEvent::IntentFailed {
                intent_id: required_str(obj, "id", "intent id")?,
            })
        }
        other => Ok(WebhookEvent::Other {
            event_type: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_subscription_updated() {
        let envelope = json!({
            "id": "evt_1",
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_123",
                "status": "active",
                "cancel_at_period_end": true,
                "current_period_end": 1700000000,
                "metadata": { "userId": "u1" },
                "plan": { "id": "plan_pro" }
            }}
        });
        match parse_event(&envelope).unwrap() {
            WebhookEvent::SubscriptionUpserted {
                user_id,
                processor_subscription_id,
                plan_id,
                status,
                current_period_end,
                cancel_at_period_end,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(processor_subscription_id, "sub_123");
                assert_eq!(plan_id, "plan_pro");
                assert_eq!(status, SubscriptionStatus::Active);
                assert_eq!(current_period_end.unwrap().timestamp(), 1700000000);
                assert!(cancel_at_period_end);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn plan_id_falls_back_to_items_path() {
        let envelope = json!({
            "type": "customer.subscription.created",
            "data": { "object": {
                "id": "sub_1",
                "status": "trialing",
                "metadata": { "userId": "u1" },
                "items": { "data": [ { "price": { "id": "price_basic" } } ] }
            }}
        });
        match parse_event(&envelope).unwrap() {
            WebhookEvent::SubscriptionUpserted { plan_id, .. } => {
                assert_eq!(plan_id, "price_basic");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn missing_user_metadata_is_an_error() {
        let envelope = json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1", "status": "canceled" } }
        });
        assert!(parse_event(&envelope).is_err());
    }

    #[test]
    fn checkout_completed_carries_the_customer_mapping() {
        let envelope = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_1",
                "customer": "cus_42",
                "metadata": { "userId": "u1" }
            }}
        });
        match parse_event(&envelope).unwrap() {
            WebhookEvent::CheckoutCompleted { user_id, customer_id } => {
                assert_eq!(user_id, "u1");
                assert_eq!(customer_id, "cus_42");
            }
            other => panic!("unexpected event {:?}", other),
        }

        // 没有 customer 字段就无从建立映射
        let envelope = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "metadata": { "userId": "u1" } } }
        });
        assert!(parse_event(&envelope).is_err());
    }

    #[test]
    fn unknown_event_type_is_other() {
        let envelope = json!({ "type": "charge.captured", "data": { "object": {} } });
        match parse_event(&envelope).unwrap() {
            WebhookEvent::Other { event_type } => assert_eq!(event_type, "charge.captured"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn invoice_events_need_a_customer() {
        let envelope = json!({
            "type": "invoice.payment_succeeded",
            "data": { "object": { "amount_paid": 500 } }
        });
        assert!(parse_event(&envelope).is_err());
    }
}
