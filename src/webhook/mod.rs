pub mod events;
pub mod signature;

use std::sync::Arc;

use crate::error::AppError;
use crate::escrow::{EscrowStatus, EscrowStore};
use crate::milestones::{MilestoneStatus, MilestoneStore};
use crate::payments::{CustomerStore, NewPayment, PaymentStatus, PaymentStore, PaymentType};
use crate::subscription::{SubscriptionStatus, SubscriptionStore, SubscriptionUpsert};

pub use events::{WebhookEvent, parse_event};
pub use signature::{sign_payload, verify_signature};

// Webhook 事件调度：把支付方的异步通知对账回本地状态。
// 单事件失败只记日志，端点仍回 200，避免重投风暴。
pub struct WebhookDispatcher {
    pub payments: Arc<dyn PaymentStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub escrows: Arc<dyn EscrowStore>,
    pub milestones: Arc<dyn MilestoneStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl WebhookDispatcher {
    pub async fn handle(&self, event: WebhookEvent) -> Result<(), AppError> {
        match event {
            WebhookEvent::SubscriptionUpserted {
                user_id,
                processor_subscription_id,
                plan_id,
                status,
                current_period_end,
                cancel_at_period_end,
            } => {
                let sub = self
                    .subscriptions
                    .upsert_subscription(SubscriptionUpsert {
                        user_id: user_id.clone(),
                        plan_id,
                        status,
                        current_period_end,
                        cancel_at_period_end,
                        processor_subscription_id: Some(processor_subscription_id),
                    })
                    .await?;
                tracing::info!(
                    user_id = %user_id,
                    status = sub.status.as_str(),
                    "subscription mirrored from webhook"
                );
                Ok(())
            }

            WebhookEvent::SubscriptionDeleted { user_id } => {
                let updated = self
                    .subscriptions
                    .set_subscription_status(&user_id, SubscriptionStatus::Canceled)
                    .await?;
                if !updated {
                    tracing::warn!(user_id = %user_id, "subscription.deleted for unknown user");
                }
                Ok(())
            }

            WebhookEvent::CheckoutCompleted {
                user_id,
                customer_id,
            } => {
                self.customers
                    .upsert_customer(&user_id, &customer_id)
                    .await?;
                tracing::info!(
                    user_id = %user_id,
                    customer_id = %customer_id,
                    "customer mapping recorded"
                );
                Ok(())
            }

            WebhookEvent::InvoicePaymentSucceeded {
                customer_id,
                amount_paid,
                currency,
            } => {
                let user_id = self.resolve_customer(&customer_id).await?;
                self.payments
                    .create_payment(NewPayment {
                        gig_id: None,
                        client_id: user_id,
                        creative_id: None,
                        amount: amount_paid,
                        currency,
                        status: PaymentStatus::Completed,
                        payment_type: PaymentType::Final,
                        processor_intent_id: None,
                        processor_customer_id: Some(customer_id),
                    })
                    .await?;
                Ok(())
            }

            WebhookEvent::InvoicePaymentFailed {
                customer_id,
                amount_due,
                currency,
            } => {
                let user_id = self.resolve_customer(&customer_id).await?;
                self.payments
                    .create_payment(NewPayment {
                        gig_id: None,
                        client_id: user_id.clone(),
                        creative_id: None,
                        amount: amount_due,
                        currency,
                        status: PaymentStatus::Failed,
                        payment_type: PaymentType::Final,
                        processor_intent_id: None,
                        processor_customer_id: Some(customer_id),
                    })
                    .await?;
                let updated = self
                    .subscriptions
                    .set_subscription_status(&user_id, SubscriptionStatus::PastDue)
                    .await?;
                if !updated {
                    tracing::warn!(user_id = %user_id, "payment_failed for user without subscription");
                }
                Ok(())
            }

            WebhookEvent::IntentSucceeded { intent_id } => {
                let Some(payment) = self.payments.get_payment_by_intent(&intent_id).await? else {
                    return Err(AppError::NotFound(format!(
                        "no payment for intent {}",
                        intent_id
                    )));
                };
                self.payments
                    .set_payment_status(&payment.id, PaymentStatus::Completed)
                    .await?;

                match payment.payment_type {
                    PaymentType::Escrow => {
                        if let Some(escrow) =
                            self.escrows.get_escrow_by_payment(&payment.id).await?
                        {
                            if escrow.status.can_transition(EscrowStatus::Funded) {
                                self.escrows
                                    .set_escrow_status(
                                        &escrow.id,
                                        EscrowStatus::Funded,
                                        None,
                                        None,
                                    )
                                    .await?;
                                tracing::info!(escrow_id = %escrow.id, "escrow funded");
                            }
                        }
                    }
                    PaymentType::Milestone => {
                        if let Some(ms) =
                            self.milestones.get_milestone_by_payment(&payment.id).await?
                        {
                            if ms.status.can_transition(MilestoneStatus::Completed) {
                                self.milestones
                                    .set_milestone_status(
                                        &ms.id,
                                        MilestoneStatus::Completed,
                                        None,
                                    )
                                    .await?;
                            }
                        }
                    }
                    PaymentType::Final => {}
                }
                Ok(())
            }

            WebhookEvent::IntentFailed { intent_id } => {
                let Some(payment) = self.payments.get_payment_by_intent(&intent_id).await? else {
                    return Err(AppError::NotFound(format!(
                        "no payment for intent {}",
                        intent_id
                    )));
                };
                self.payments
                    .set_payment_status(&payment.id, PaymentStatus::Failed)
                    .await?;

                if payment.payment_type == PaymentType::Milestone {
                    if let Some(ms) =
                        self.milestones.get_milestone_by_payment(&payment.id).await?
                    {
                        if ms.status.can_transition(MilestoneStatus::Failed) {
                            self.milestones
                                .set_milestone_status(&ms.id, MilestoneStatus::Failed, None)
                                .await?;
                        }
                    }
                }
                Ok(())
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "unhandled webhook event");
                Ok(())
            }
        }
    }

    async fn resolve_customer(&self, customer_id: &str) -> Result<String, AppError> {
        self.customers
            .get_user_by_customer(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("unknown customer {}", customer_id)))
    }
}
