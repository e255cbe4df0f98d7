//! Specialist profiles: which tools each specialist may call and how its
//! instructions are rendered for a customer.

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use supportdesk_core::config::PolicyConfig;
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::specialist::SpecialistId;

use crate::tools::ToolId;

const TRIAGE_TEMPLATE: &str = "triage.txt.tera";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

/// Static description of one specialist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpecialistProfile {
    pub id: SpecialistId,
    pub template: &'static str,
    pub premium_label: &'static str,
    /// Text only ever present in prompts rendered for premium tiers.
    pub premium_clause: &'static str,
    tools: &'static [ToolId],
}

const ACCOUNT: SpecialistProfile = SpecialistProfile {
    id: SpecialistId::Account,
    template: "account.txt.tera",
    premium_label: "(Premium Account Services)",
    premium_clause: "프리미엄 기능: 강화된 보안 옵션 및 우선 복구 서비스 제공.",
    tools: &[
        ToolId::ResetPassword,
        ToolId::EnableTwoFactor,
        ToolId::UpdateEmail,
        ToolId::DeactivateAccount,
        ToolId::ExportAccountData,
    ],
};

const BILLING: SpecialistProfile = SpecialistProfile {
    id: SpecialistId::Billing,
    template: "billing.txt.tera",
    premium_label: "(Premium Billing Support)",
    premium_clause: "프리미엄 혜택: 환불 우선 처리 및 유연한 결제 옵션 제공.",
    tools: &[
        ToolId::LookupBillingHistory,
        ToolId::ProcessRefund,
        ToolId::UpdatePaymentMethod,
        ToolId::ApplyBillingCredit,
    ],
};

const ORDER: SpecialistProfile = SpecialistProfile {
    id: SpecialistId::Order,
    template: "order.txt.tera",
    premium_label: "(Premium Shipping)",
    premium_clause: "프리미엄 혜택: 무료 특급 배송 및 반품, 우선 처리 대상.",
    tools: &[
        ToolId::LookupOrderStatus,
        ToolId::InitiateReturn,
        ToolId::ScheduleRedelivery,
        ToolId::ExpediteShipping,
    ],
};

const TECHNICAL: SpecialistProfile = SpecialistProfile {
    id: SpecialistId::Technical,
    template: "technical.txt.tera",
    premium_label: "(Premium Support)",
    premium_clause: "프리미엄 우선 처리: 표준 해결책이 효과가 없을 때는 선임 엔지니어로 직접 에스컬레이션을 제안합니다.",
    tools: &[
        ToolId::RunDiagnostic,
        ToolId::ProvideTroubleshootingSteps,
        ToolId::EscalateToEngineering,
    ],
};

impl SpecialistProfile {
    pub fn of(id: SpecialistId) -> &'static SpecialistProfile {
        match id {
            SpecialistId::Account => &ACCOUNT,
            SpecialistId::Billing => &BILLING,
            SpecialistId::Order => &ORDER,
            SpecialistId::Technical => &TECHNICAL,
        }
    }

    pub fn tool_subset(&self) -> &'static [ToolId] {
        self.tools
    }

    pub fn allows(&self, tool: ToolId) -> bool {
        self.tools.contains(&tool)
    }
}

#[derive(Serialize)]
struct CustomerView<'a> {
    name: &'a str,
    email: &'a str,
    tier: &'static str,
    premium: bool,
}

/// Renders specialist and triage instructions from the bundled templates and
/// the configured policy table. Holds no per-customer state.
#[derive(Clone, Debug)]
pub struct PromptRenderer {
    tera: Tera,
    policy: PolicyConfig,
    max_clarifications: u32,
}

impl PromptRenderer {
    pub fn new(policy: PolicyConfig, max_clarifications: u32) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (TRIAGE_TEMPLATE, include_str!("../../../templates/prompts/triage.txt.tera")),
            (ACCOUNT.template, include_str!("../../../templates/prompts/account.txt.tera")),
            (BILLING.template, include_str!("../../../templates/prompts/billing.txt.tera")),
            (ORDER.template, include_str!("../../../templates/prompts/order.txt.tera")),
            (TECHNICAL.template, include_str!("../../../templates/prompts/technical.txt.tera")),
        ])?;
        Ok(Self { tera, policy, max_clarifications })
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn render_specialist(
        &self,
        id: SpecialistId,
        ctx: &UserContext,
    ) -> Result<String, RenderError> {
        let profile = SpecialistProfile::of(id);
        let mut context = self.base_context(ctx)?;
        let premium = ctx.is_premium();
        match id {
            SpecialistId::Billing => context
                .insert("refund_processing_days", &self.policy.refund_processing_days(premium)),
            SpecialistId::Technical => {
                context.insert("escalation_sla_hours", &self.policy.escalation_sla_hours(premium))
            }
            SpecialistId::Account | SpecialistId::Order => {}
        }
        Ok(self.tera.render(profile.template, &context)?)
    }

    pub fn render_triage(&self, ctx: &UserContext) -> Result<String, RenderError> {
        let mut context = self.base_context(ctx)?;
        context.insert("max_clarifications", &self.max_clarifications);
        Ok(self.tera.render(TRIAGE_TEMPLATE, &context)?)
    }

    fn base_context(&self, ctx: &UserContext) -> Result<Context, RenderError> {
        let view = CustomerView {
            name: ctx.name(),
            email: ctx.email(),
            tier: ctx.tier().as_str(),
            premium: ctx.is_premium(),
        };
        let mut context = Context::from_serialize(&view)?;
        context.insert("policy", &self.policy);
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use supportdesk_core::config::PolicyConfig;
    use supportdesk_core::domain::customer::{Tier, UserContext};
    use supportdesk_core::domain::specialist::SpecialistId;

    use super::{PromptRenderer, SpecialistProfile};
    use crate::tools::ToolId;

    fn renderer() -> PromptRenderer {
        PromptRenderer::new(PolicyConfig::default(), 2).expect("templates load")
    }

    fn ctx(tier: Tier) -> UserContext {
        UserContext::new("1", "nana", "ktra@example.com", tier)
    }

    #[test]
    fn rendering_is_deterministic() {
        let renderer = renderer();
        for id in SpecialistId::ALL {
            let first = renderer.render_specialist(id, &ctx(Tier::Premium)).expect("render");
            let second = renderer.render_specialist(id, &ctx(Tier::Premium)).expect("render");
            assert_eq!(first, second, "{id} prompt changed between renders");
        }
    }

    #[test]
    fn premium_clause_follows_tier() {
        let renderer = renderer();
        for id in SpecialistId::ALL {
            let profile = SpecialistProfile::of(id);
            let basic = renderer.render_specialist(id, &ctx(Tier::Basic)).expect("render");
            assert!(
                !basic.contains(profile.premium_clause),
                "{id} basic prompt has premium clause"
            );
            assert!(!basic.contains(profile.premium_label));

            for tier in [Tier::Premium, Tier::Enterprise] {
                let premium = renderer.render_specialist(id, &ctx(tier)).expect("render");
                assert!(
                    premium.contains(profile.premium_clause),
                    "{id} {tier} prompt lacks clause"
                );
                assert!(premium.contains(profile.premium_label));
            }
        }
    }

    #[test]
    fn policy_numbers_come_from_configuration() {
        let policy = PolicyConfig {
            refund_window_days: 45,
            escalation_sla_hours_basic: 6,
            return_label_fee_basic: Decimal::new(799, 2),
            ..PolicyConfig::default()
        };
        let renderer = PromptRenderer::new(policy, 2).expect("templates load");

        let billing =
            renderer.render_specialist(SpecialistId::Billing, &ctx(Tier::Basic)).expect("render");
        assert!(billing.contains("45일"));
        assert!(billing.contains("영업일 기준 5일"));

        let technical =
            renderer.render_specialist(SpecialistId::Technical, &ctx(Tier::Basic)).expect("render");
        assert!(technical.contains("응답 시간: 6시간"));

        let order =
            renderer.render_specialist(SpecialistId::Order, &ctx(Tier::Basic)).expect("render");
        assert!(order.contains("7.99"));
    }

    #[test]
    fn triage_prompt_names_the_customer() {
        let prompt = renderer().render_triage(&ctx(Tier::Enterprise)).expect("render");
        assert!(prompt.contains("nana"));
        assert!(prompt.contains("ktra@example.com"));
        assert!(prompt.contains("enterprise"));
    }

    #[test]
    fn tool_subsets_are_disjoint_and_complete() {
        let mut seen = Vec::new();
        for id in SpecialistId::ALL {
            for tool in SpecialistProfile::of(id).tool_subset() {
                assert_eq!(tool.owner(), id);
                assert!(!seen.contains(tool));
                seen.push(*tool);
            }
        }
        assert_eq!(seen.len(), ToolId::ALL.len());
        assert!(SpecialistProfile::of(SpecialistId::Order).allows(ToolId::ExpediteShipping));
        assert!(!SpecialistProfile::of(SpecialistId::Technical).allows(ToolId::ProcessRefund));
    }
}
