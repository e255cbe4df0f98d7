//! Tool catalog shared by the four specialists.
//!
//! Backends are mocks, but every tool honours the contract a real backend
//! would: lookups are seeded by their arguments so repeated calls agree,
//! actions return a correlation id, and anything sent to the customer goes to
//! the address on the session context, never to one taken from arguments.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use supportdesk_core::config::PolicyConfig;
use supportdesk_core::domain::customer::UserContext;
use supportdesk_core::domain::specialist::SpecialistId;
use supportdesk_core::errors::DomainError;

use crate::specialists::SpecialistProfile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    ResetPassword,
    EnableTwoFactor,
    UpdateEmail,
    DeactivateAccount,
    ExportAccountData,
    LookupBillingHistory,
    ProcessRefund,
    UpdatePaymentMethod,
    ApplyBillingCredit,
    LookupOrderStatus,
    InitiateReturn,
    ScheduleRedelivery,
    ExpediteShipping,
    RunDiagnostic,
    ProvideTroubleshootingSteps,
    EscalateToEngineering,
}

impl ToolId {
    pub const ALL: [ToolId; 16] = [
        ToolId::ResetPassword,
        ToolId::EnableTwoFactor,
        ToolId::UpdateEmail,
        ToolId::DeactivateAccount,
        ToolId::ExportAccountData,
        ToolId::LookupBillingHistory,
        ToolId::ProcessRefund,
        ToolId::UpdatePaymentMethod,
        ToolId::ApplyBillingCredit,
        ToolId::LookupOrderStatus,
        ToolId::InitiateReturn,
        ToolId::ScheduleRedelivery,
        ToolId::ExpediteShipping,
        ToolId::RunDiagnostic,
        ToolId::ProvideTroubleshootingSteps,
        ToolId::EscalateToEngineering,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResetPassword => "reset_password",
            Self::EnableTwoFactor => "enable_two_factor",
            Self::UpdateEmail => "update_email",
            Self::DeactivateAccount => "deactivate_account",
            Self::ExportAccountData => "export_account_data",
            Self::LookupBillingHistory => "lookup_billing_history",
            Self::ProcessRefund => "process_refund",
            Self::UpdatePaymentMethod => "update_payment_method",
            Self::ApplyBillingCredit => "apply_billing_credit",
            Self::LookupOrderStatus => "lookup_order_status",
            Self::InitiateReturn => "initiate_return",
            Self::ScheduleRedelivery => "schedule_redelivery",
            Self::ExpediteShipping => "expedite_shipping",
            Self::RunDiagnostic => "run_diagnostic",
            Self::ProvideTroubleshootingSteps => "provide_troubleshooting_steps",
            Self::EscalateToEngineering => "escalate_to_engineering",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|tool| tool.as_str() == value)
    }

    /// One-line signature and purpose, as offered to model-backed responders.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResetPassword => {
                "reset_password(): 고객 이메일로 1회용 비밀번호 재설정 링크를 보냄"
            }
            Self::EnableTwoFactor => {
                "enable_two_factor(method: \"app\"|\"sms\"|\"email\" = \"app\"): 2단계 인증 설정"
            }
            Self::UpdateEmail => "update_email(new_email: string): 계정 이메일 변경 요청",
            Self::DeactivateAccount => {
                "deactivate_account(reason: string, feedback?: string): 계정 비활성화 요청"
            }
            Self::ExportAccountData => {
                "export_account_data(data_types: string): 계정 데이터 내보내기 생성"
            }
            Self::LookupBillingHistory => {
                "lookup_billing_history(months_back?: integer): 청구 및 결제 내역 조회"
            }
            Self::ProcessRefund => {
                "process_refund(refund_amount: number, reason: string): 환불 요청 처리"
            }
            Self::UpdatePaymentMethod => {
                "update_payment_method(payment_type: \"credit_card\"|\"paypal\"|\"bank_transfer\"): 결제 수단 변경 링크 발송"
            }
            Self::ApplyBillingCredit => {
                "apply_billing_credit(credit_amount: number, reason: string): 계정 크레딧 적용"
            }
            Self::LookupOrderStatus => "lookup_order_status(order_number: string): 주문 상태 조회",
            Self::InitiateReturn => {
                "initiate_return(order_number: string, return_reason: string, items: string): 반품 시작"
            }
            Self::ScheduleRedelivery => {
                "schedule_redelivery(tracking_number: string, preferred_date: string): 재배송 예약"
            }
            Self::ExpediteShipping => {
                "expedite_shipping(order_number: string): 배송 속도 업그레이드 (프리미엄 전용)"
            }
            Self::RunDiagnostic => {
                "run_diagnostic(product_name: string, issue_description: string): 진단 점검 실행"
            }
            Self::ProvideTroubleshootingSteps => {
                "provide_troubleshooting_steps(issue_type: \"connection\"|\"login\"|\"performance\"|\"crash\"|string): 단계별 해결 방법 안내"
            }
            Self::EscalateToEngineering => {
                "escalate_to_engineering(issue_summary: string, priority?: \"low\"|\"medium\"|\"high\"|\"critical\"): 엔지니어링 팀 에스컬레이션"
            }
        }
    }

    pub fn owner(&self) -> SpecialistId {
        match self {
            Self::ResetPassword
            | Self::EnableTwoFactor
            | Self::UpdateEmail
            | Self::DeactivateAccount
            | Self::ExportAccountData => SpecialistId::Account,
            Self::LookupBillingHistory
            | Self::ProcessRefund
            | Self::UpdatePaymentMethod
            | Self::ApplyBillingCredit => SpecialistId::Billing,
            Self::LookupOrderStatus
            | Self::InitiateReturn
            | Self::ScheduleRedelivery
            | Self::ExpediteShipping => SpecialistId::Order,
            Self::RunDiagnostic
            | Self::ProvideTroubleshootingSteps
            | Self::EscalateToEngineering => SpecialistId::Technical,
        }
    }

    /// Tools that change customer state and must hand back a correlation id.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::ExportAccountData
                | Self::LookupBillingHistory
                | Self::LookupOrderStatus
                | Self::RunDiagnostic
                | Self::ProvideTroubleshootingSteps
                | Self::EscalateToEngineering
        )
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Rejected(#[from] DomainError),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("backend failure in {tool}: {message}")]
    Backend { tool: ToolId, message: String },
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;
    async fn execute(&self, ctx: &UserContext, args: Value) -> Result<String, ToolError>;
}

/// Result of one tool call as seen by a responder. Failures are already
/// rendered into `output`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub output: String,
    pub succeeded: bool,
}

#[derive(Default)]
pub struct ToolCatalog {
    tools: HashMap<ToolId, Arc<dyn Tool>>,
}

impl ToolCatalog {
    /// Mock backends for every tool, driven by the given policy table.
    pub fn standard(policy: PolicyConfig) -> Self {
        let policy = Arc::new(policy);
        let mut catalog = Self::default();
        for id in ToolId::ALL {
            catalog.register(MockBackendTool { id, policy: Arc::clone(&policy) });
        }
        catalog
    }

    /// Registers a tool, replacing any previous implementation with the same id.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.id(), Arc::new(tool));
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub async fn try_invoke(
        &self,
        specialist: SpecialistId,
        name: &str,
        ctx: &UserContext,
        args: Value,
    ) -> Result<String, ToolError> {
        let id = ToolId::parse(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        if !SpecialistProfile::of(specialist).allows(id) {
            return Err(DomainError::ToolNotAvailable {
                tool: id.to_string(),
                specialist: specialist.to_string(),
            }
            .into());
        }
        let tool = self.tools.get(&id).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(ctx, args).await
    }

    /// Runs a tool and never fails: errors become a descriptive message the
    /// specialist can relay or work around.
    pub async fn invoke(
        &self,
        specialist: SpecialistId,
        name: &str,
        ctx: &UserContext,
        args: Value,
    ) -> ToolInvocation {
        match self.try_invoke(specialist, name, ctx, args).await {
            Ok(output) => ToolInvocation { tool: name.to_string(), output, succeeded: true },
            Err(error) => ToolInvocation {
                tool: name.to_string(),
                output: format!("작업을 완료하지 못함 ({name}): {error}"),
                succeeded: false,
            },
        }
    }
}

struct MockBackendTool {
    id: ToolId,
    policy: Arc<PolicyConfig>,
}

#[async_trait]
impl Tool for MockBackendTool {
    fn id(&self) -> ToolId {
        self.id
    }

    async fn execute(&self, ctx: &UserContext, args: Value) -> Result<String, ToolError> {
        let policy = self.policy.as_ref();
        match self.id {
            ToolId::ResetPassword => {
                let _: NoArgs = parse_args(self.id, args)?;
                Ok(reset_password(ctx, policy))
            }
            ToolId::EnableTwoFactor => enable_two_factor(ctx, parse_args(self.id, args)?),
            ToolId::UpdateEmail => update_email(ctx, policy, parse_args(self.id, args)?),
            ToolId::DeactivateAccount => {
                deactivate_account(ctx, policy, parse_args(self.id, args)?)
            }
            ToolId::ExportAccountData => {
                export_account_data(ctx, policy, parse_args(self.id, args)?)
            }
            ToolId::LookupBillingHistory => {
                lookup_billing_history(ctx, policy, parse_args(self.id, args)?)
            }
            ToolId::ProcessRefund => process_refund(ctx, policy, parse_args(self.id, args)?),
            ToolId::UpdatePaymentMethod => {
                update_payment_method(ctx, policy, parse_args(self.id, args)?)
            }
            ToolId::ApplyBillingCredit => apply_billing_credit(ctx, parse_args(self.id, args)?),
            ToolId::LookupOrderStatus => lookup_order_status(ctx, parse_args(self.id, args)?),
            ToolId::InitiateReturn => initiate_return(ctx, policy, parse_args(self.id, args)?),
            ToolId::ScheduleRedelivery => schedule_redelivery(ctx, parse_args(self.id, args)?),
            ToolId::ExpediteShipping => expedite_shipping(ctx, parse_args(self.id, args)?),
            ToolId::RunDiagnostic => run_diagnostic(ctx, parse_args(self.id, args)?),
            ToolId::ProvideTroubleshootingSteps => {
                provide_troubleshooting_steps(ctx, parse_args(self.id, args)?)
            }
            ToolId::EscalateToEngineering => {
                escalate_to_engineering(ctx, policy, parse_args(self.id, args)?)
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: ToolId, args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(args).map_err(|error| invalid(tool, error.to_string()))
}

fn invalid(tool: ToolId, reason: impl Into<String>) -> ToolError {
    DomainError::InvalidToolArguments { tool: tool.to_string(), reason: reason.into() }.into()
}

fn required<'a>(tool: ToolId, field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(tool, format!("`{field}` must not be empty")));
    }
    Ok(trimmed)
}

fn positive_amount(tool: ToolId, field: &str, amount: Decimal) -> Result<Decimal, ToolError> {
    if amount <= Decimal::ZERO {
        return Err(invalid(tool, format!("`{field}` must be greater than zero")));
    }
    Ok(amount.round_dp(2))
}

fn correlation_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", suffix[..10].to_ascii_uppercase())
}

fn seeded_rng(ctx: &UserContext, tool: ToolId, key: &str) -> StdRng {
    let mut hasher = DefaultHasher::new();
    ctx.customer_id().hash(&mut hasher);
    tool.as_str().hash(&mut hasher);
    key.hash(&mut hasher);
    StdRng::seed_from_u64(hasher.finish())
}

#[derive(Deserialize)]
struct NoArgs {}

fn reset_password(ctx: &UserContext, policy: &PolicyConfig) -> String {
    format!(
        "비밀번호 재설정을 시작함\n재설정 링크가 전송됨: {}\n재설정 토큰: {}\n링크 만료: {}시간\n보안을 위해 링크는 1회용임",
        ctx.email(),
        correlation_id("RST"),
        policy.password_reset_expiry_hours
    )
}

#[derive(Deserialize)]
struct TwoFactorArgs {
    #[serde(default = "default_two_factor_method")]
    method: String,
}

fn default_two_factor_method() -> String {
    "app".to_string()
}

fn enable_two_factor(ctx: &UserContext, args: TwoFactorArgs) -> Result<String, ToolError> {
    let method = args.method.trim().to_ascii_lowercase();
    if !matches!(method.as_str(), "app" | "sms" | "email") {
        return Err(invalid(ToolId::EnableTwoFactor, format!("unsupported method `{method}`")));
    }
    Ok(format!(
        "2단계 인증 설정\n방식: {}\n설정 코드: {}\n설정 안내가 전송됨: {}\n보안 강화 기능이 활성화됨",
        method.to_ascii_uppercase(),
        correlation_id("2FA"),
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct UpdateEmailArgs {
    new_email: String,
}

fn update_email(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: UpdateEmailArgs,
) -> Result<String, ToolError> {
    let new_email = required(ToolId::UpdateEmail, "new_email", &args.new_email)?;
    if !looks_like_email(new_email) {
        return Err(invalid(ToolId::UpdateEmail, format!("`{new_email}` is not an email address")));
    }
    if new_email.eq_ignore_ascii_case(ctx.email()) {
        return Err(invalid(ToolId::UpdateEmail, "new address equals the current one"));
    }
    Ok(format!(
        "이메일 변경 요청 접수\n변경 전: {}\n변경 후: {new_email}\n검증 코드: {}\n검증 안내가 기존 주소로 전송됨: {}\n코드 만료: {}분\n검증 완료 후 변경이 적용됨",
        ctx.email(),
        correlation_id("VER"),
        ctx.email(),
        policy.email_verification_expiry_minutes
    ))
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Deserialize)]
struct DeactivateArgs {
    reason: String,
    #[serde(default)]
    feedback: Option<String>,
}

fn deactivate_account(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: DeactivateArgs,
) -> Result<String, ToolError> {
    let reason = required(ToolId::DeactivateAccount, "reason", &args.reason)?;
    let feedback = args
        .feedback
        .as_deref()
        .map(str::trim)
        .filter(|feedback| !feedback.is_empty())
        .unwrap_or("입력 없음");
    Ok(format!(
        "계정 비활성화를 시작함\n요청 ID: {}\n계정: {}\n사유: {reason}\n피드백: {feedback}\n계정은 {}시간 후 비활성화됨\n{}일 이내 재활성화 가능\n확인 메일이 전송됨: {}",
        correlation_id("DEA"),
        ctx.customer_id(),
        policy.deactivation_delay_hours,
        policy.reactivation_window_days,
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct ExportArgs {
    data_types: String,
}

fn export_account_data(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: ExportArgs,
) -> Result<String, ToolError> {
    let data_types = required(ToolId::ExportAccountData, "data_types", &args.data_types)?;
    Ok(format!(
        "데이터 내보내기 요청 접수\n내보내기 ID: {}\n데이터 유형: {data_types}\n처리 시간: {}~{}시간\n다운로드 링크가 전송될 주소: {}\n링크 만료: {}일",
        correlation_id("EXP"),
        policy.export_processing_min_hours,
        policy.export_processing_max_hours,
        ctx.email(),
        policy.export_link_expiry_days
    ))
}

#[derive(Deserialize)]
struct BillingHistoryArgs {
    #[serde(default)]
    months_back: Option<u32>,
}

fn lookup_billing_history(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: BillingHistoryArgs,
) -> Result<String, ToolError> {
    let months = args.months_back.unwrap_or(policy.billing_history_default_months);
    if !(1..=24).contains(&months) {
        return Err(invalid(ToolId::LookupBillingHistory, "`months_back` must be between 1 and 24"));
    }

    let mut rng = seeded_rng(ctx, ToolId::LookupBillingHistory, &months.to_string());
    let amounts = [Decimal::new(2999, 2), Decimal::new(4999, 2), Decimal::new(9999, 2)];
    let statuses = ["Paid", "Paid", "Paid", "Failed"];
    let today = Utc::now().date_naive();
    let lines = (0..months)
        .map(|month| {
            let date = today - Duration::days(30 * i64::from(month));
            let amount = amounts.choose(&mut rng).copied().unwrap_or(Decimal::ZERO);
            let status = statuses.choose(&mut rng).copied().unwrap_or("Paid");
            format!("• {}: ${amount} - {status}", date.format("%b %Y"))
        })
        .collect::<Vec<_>>();

    Ok(format!("청구 내역 (최근 {months}개월):\n{}", lines.join("\n")))
}

#[derive(Deserialize)]
struct RefundArgs {
    refund_amount: Decimal,
    reason: String,
}

fn process_refund(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: RefundArgs,
) -> Result<String, ToolError> {
    let amount = positive_amount(ToolId::ProcessRefund, "refund_amount", args.refund_amount)?;
    let reason = required(ToolId::ProcessRefund, "reason", &args.reason)?;
    Ok(format!(
        "환불 요청을 처리함\n환불 ID: {}\n금액: ${amount}\n사유: {reason}\n처리 기간: 영업일 기준 {}일\n환불은 원 결제수단으로 반환됨\n확인 메일이 전송됨: {}",
        correlation_id("REF"),
        policy.refund_processing_days(ctx.is_premium()),
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct PaymentMethodArgs {
    payment_type: String,
}

fn update_payment_method(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: PaymentMethodArgs,
) -> Result<String, ToolError> {
    let label = match args.payment_type.trim().to_ascii_lowercase().as_str() {
        "credit_card" => "Credit Card",
        "paypal" => "Paypal",
        "bank_transfer" => "Bank Transfer",
        other => {
            return Err(invalid(
                ToolId::UpdatePaymentMethod,
                format!("unsupported payment type `{other}`"),
            ))
        }
    };
    Ok(format!(
        "결제 수단 업데이트를 시작함\n요청 ID: {}\n유형: {label}\n보안 링크가 다음 주소로 전송됨: {}\n링크 유효기간: {}시간\n현재 서비스는 중단 없이 유지됨",
        correlation_id("PAY"),
        ctx.email(),
        policy.payment_link_expiry_hours
    ))
}

#[derive(Deserialize)]
struct CreditArgs {
    credit_amount: Decimal,
    reason: String,
}

fn apply_billing_credit(ctx: &UserContext, args: CreditArgs) -> Result<String, ToolError> {
    let amount = positive_amount(ToolId::ApplyBillingCredit, "credit_amount", args.credit_amount)?;
    let reason = required(ToolId::ApplyBillingCredit, "reason", &args.reason)?;
    Ok(format!(
        "계정 크레딧을 적용함\n크레딧 ID: {}\n금액: ${amount}\n사유: {reason}\n적용 계정: {}\n확인 메일이 전송됨: {}",
        correlation_id("CRD"),
        ctx.customer_id(),
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct OrderArgs {
    order_number: String,
}

fn lookup_order_status(ctx: &UserContext, args: OrderArgs) -> Result<String, ToolError> {
    let order_number = required(ToolId::LookupOrderStatus, "order_number", &args.order_number)?;
    let mut rng = seeded_rng(ctx, ToolId::LookupOrderStatus, order_number);
    let status = ["Processing", "Shipped", "In Transit", "Delivered"]
        .choose(&mut rng)
        .copied()
        .unwrap_or("Processing");
    let tracking_number = format!("1Z{}", rng.gen_range(100_000..=999_999));
    let estimated = Utc::now().date_naive() + Duration::days(rng.gen_range(1..=5));
    Ok(format!(
        "주문 상태: {order_number}\n상태: {status}\n운송장: {tracking_number}\n예상 배송일: {}\n배송 알림 수신 주소: {}",
        estimated.format("%B %d, %Y"),
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct ReturnArgs {
    order_number: String,
    return_reason: String,
    items: String,
}

fn initiate_return(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: ReturnArgs,
) -> Result<String, ToolError> {
    let order_number = required(ToolId::InitiateReturn, "order_number", &args.order_number)?;
    let reason = required(ToolId::InitiateReturn, "return_reason", &args.return_reason)?;
    let items = required(ToolId::InitiateReturn, "items", &args.items)?;
    Ok(format!(
        "반품을 시작함\n반품 ID: {}\n주문: {order_number}\n반품 품목: {items}\n반품 사유: {reason}\n반품 라벨 비용: ${}\n반품 라벨이 전송됨: {}\n반품 가능 기간: {}일",
        correlation_id("RET"),
        policy.return_label_fee(ctx.is_premium()),
        ctx.email(),
        policy.return_window_days
    ))
}

#[derive(Deserialize)]
struct RedeliveryArgs {
    tracking_number: String,
    preferred_date: String,
}

fn schedule_redelivery(ctx: &UserContext, args: RedeliveryArgs) -> Result<String, ToolError> {
    let tracking_number =
        required(ToolId::ScheduleRedelivery, "tracking_number", &args.tracking_number)?;
    let preferred_date =
        required(ToolId::ScheduleRedelivery, "preferred_date", &args.preferred_date)?;
    Ok(format!(
        "재배송을 예약함\n예약 ID: {}\n운송장: {tracking_number}\n새 배송일: {preferred_date}\n주소 확인 안내가 전송됨: {}\n배송 30분 전에 기사 연락 예정",
        correlation_id("RDL"),
        ctx.email()
    ))
}

pub const EXPEDITE_INELIGIBLE: &str = "배송 속도 업그레이드는 프리미엄 멤버십이 필요함";

fn expedite_shipping(ctx: &UserContext, args: OrderArgs) -> Result<String, ToolError> {
    let order_number = required(ToolId::ExpediteShipping, "order_number", &args.order_number)?;
    if !ctx.is_premium() {
        return Ok(EXPEDITE_INELIGIBLE.to_string());
    }
    Ok(format!(
        "배송 속도를 업그레이드함\n요청 ID: {}\n주문: {order_number}\n업그레이드: 익일 배송\n추가 요금 없음 (프리미엄 혜택)\n업데이트된 운송장 정보가 전송됨: {}",
        correlation_id("SHP"),
        ctx.email()
    ))
}

#[derive(Deserialize)]
struct DiagnosticArgs {
    product_name: String,
    issue_description: String,
}

fn run_diagnostic(ctx: &UserContext, args: DiagnosticArgs) -> Result<String, ToolError> {
    let product = required(ToolId::RunDiagnostic, "product_name", &args.product_name)?;
    let issue = required(ToolId::RunDiagnostic, "issue_description", &args.issue_description)?;
    let mut rng = seeded_rng(ctx, ToolId::RunDiagnostic, &format!("{product}\u{1f}{issue}"));
    let cache_usage = rng.gen_range(40..=95);
    let cache_note = if cache_usage >= 80 { " (정리 권장)" } else { "" };
    let last_update_days = rng.gen_range(1..=14);
    let update_note = if last_update_days >= 7 { " (업데이트 가능)" } else { "" };
    Ok(format!(
        "다음은 {product}에 대한 진단 결과:\nServer connectivity: 정상\nAPI endpoints: 응답 양호\nCache memory: {cache_usage}% 사용{cache_note}\nDatabase connections: 안정적\nLast update: {last_update_days}일 전{update_note}"
    ))
}

#[derive(Deserialize)]
struct TroubleshootingArgs {
    issue_type: String,
}

fn provide_troubleshooting_steps(
    ctx: &UserContext,
    args: TroubleshootingArgs,
) -> Result<String, ToolError> {
    let issue_type =
        required(ToolId::ProvideTroubleshootingSteps, "issue_type", &args.issue_type)?;
    let steps: &[&str] = match issue_type.to_lowercase().as_str() {
        "connection" => &[
            "1. 인터넷 연결 상태 확인",
            "2. 브라우저 캐시 및 쿠키 삭제",
            "3. 브라우저 확장 프로그램 일시 비활성화",
            "4. 시크릿/프라이빗 모드로 재시도",
            "5. 라우터/모뎀 재부팅",
        ],
        "login" => &[
            "1. 사용자명과 비밀번호 확인",
            "2. Caps Lock 해제 여부 확인",
            "3. 브라우저 캐시 삭제",
            "4. 필요 시 비밀번호 재설정",
            "5. VPN 일시 비활성화",
        ],
        "performance" => &[
            "1. 불필요한 브라우저 탭 닫기",
            "2. 브라우저 캐시 삭제",
            "3. 사용 가능한 RAM 및 저장 공간 확인",
            "4. 브라우저 업데이트",
            "5. 애플리케이션 재시작",
        ],
        "crash" => &[
            "1. 최신 버전으로 업데이트",
            "2. 애플리케이션 재시작",
            "3. 시스템 요구사항 확인",
            "4. 충돌 가능성이 있는 소프트웨어 비활성화",
            "5. 안전 모드로 실행",
        ],
        _ => &["1. 애플리케이션 재시작", "2. 업데이트 여부 확인", "3. 오류 상세와 함께 지원 팀에 문의"],
    };

    ctx.record_troubleshooting_step(format!("{issue_type} 유형 트러블슈팅 단계 제공함"));
    Ok(format!("{issue_type} 이슈에 대한 트러블슈팅 단계:\n{}", steps.join("\n")))
}

#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    fn as_upper(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Deserialize)]
struct EscalationArgs {
    issue_summary: String,
    #[serde(default)]
    priority: Priority,
}

fn escalate_to_engineering(
    ctx: &UserContext,
    policy: &PolicyConfig,
    args: EscalationArgs,
) -> Result<String, ToolError> {
    let summary = required(ToolId::EscalateToEngineering, "issue_summary", &args.issue_summary)?;
    Ok(format!(
        "엔지니어링 팀으로 이슈를 에스컬레이션함\n티켓 ID: {}\n우선순위: {}\n요약: {summary}\n예상 응답 시간: {}시간\n진행 상황 안내 주소: {}",
        correlation_id("ENG"),
        args.priority.as_upper(),
        policy.escalation_sla_hours(ctx.is_premium()),
        ctx.email()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use supportdesk_core::config::PolicyConfig;
    use supportdesk_core::domain::customer::{Tier, UserContext};
    use supportdesk_core::domain::specialist::SpecialistId;

    use super::{Tool, ToolCatalog, ToolError, ToolId, EXPEDITE_INELIGIBLE};

    fn catalog() -> ToolCatalog {
        ToolCatalog::standard(PolicyConfig::default())
    }

    fn ctx(tier: Tier) -> UserContext {
        UserContext::new("1", "nana", "ktra@example.com", tier)
    }

    #[test]
    fn standard_catalog_registers_every_tool() {
        let catalog = catalog();
        assert_eq!(catalog.len(), ToolId::ALL.len());
        for tool in ToolId::ALL {
            assert_eq!(ToolId::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolId::parse("drop_tables"), None);
    }

    #[tokio::test]
    async fn expedite_requires_premium_and_echoes_the_order() {
        let catalog = catalog();

        let args = json!({"order_number": "A-100"});
        let basic = catalog
            .invoke(SpecialistId::Order, "expedite_shipping", &ctx(Tier::Basic), args.clone())
            .await;
        assert_eq!(basic.output, EXPEDITE_INELIGIBLE);
        assert!(!basic.output.contains("SHP-"));

        let premium = catalog
            .invoke(SpecialistId::Order, "expedite_shipping", &ctx(Tier::Premium), args)
            .await;
        assert!(premium.succeeded);
        assert!(premium.output.contains("A-100"));
        assert!(premium.output.contains("SHP-"));
    }

    #[tokio::test]
    async fn messages_always_go_to_the_session_address() {
        let catalog = catalog();
        let ctx = ctx(Tier::Basic);

        let reset = catalog
            .invoke(
                SpecialistId::Account,
                "reset_password",
                &ctx,
                json!({"email": "attacker@evil.example"}),
            )
            .await;
        assert!(reset.succeeded);
        assert!(reset.output.contains("ktra@example.com"));
        assert!(!reset.output.contains("attacker"));

        let change = catalog
            .invoke(
                SpecialistId::Account,
                "update_email",
                &ctx,
                json!({"new_email": "new@example.com"}),
            )
            .await;
        assert!(change.output.contains("검증 안내가 기존 주소로 전송됨: ktra@example.com"));
    }

    #[tokio::test]
    async fn mutating_tools_return_fresh_correlation_ids() {
        let catalog = catalog();
        let ctx = ctx(Tier::Basic);
        let args = json!({"refund_amount": "49.99", "reason": "중복 결제"});

        let first =
            catalog.invoke(SpecialistId::Billing, "process_refund", &ctx, args.clone()).await;
        let second = catalog.invoke(SpecialistId::Billing, "process_refund", &ctx, args).await;
        assert!(first.output.contains("REF-"));
        assert!(first.output.contains("$49.99"));
        assert!(first.output.contains("영업일 기준 5일"));
        assert_ne!(first.output, second.output);
    }

    #[tokio::test]
    async fn lookups_are_stable_for_identical_arguments() {
        let catalog = catalog();
        let ctx = ctx(Tier::Basic);
        let args = json!({"order_number": "12345"});

        let first =
            catalog.invoke(SpecialistId::Order, "lookup_order_status", &ctx, args.clone()).await;
        let second = catalog.invoke(SpecialistId::Order, "lookup_order_status", &ctx, args).await;
        assert_eq!(first, second);
        assert!(first.output.contains("운송장: 1Z"));

        let history = catalog
            .invoke(SpecialistId::Billing, "lookup_billing_history", &ctx, Value::Null)
            .await;
        assert!(history.output.starts_with("청구 내역 (최근 6개월)"));
        assert_eq!(history.output.lines().count(), 7);
    }

    #[tokio::test]
    async fn troubleshooting_appends_exactly_one_log_entry() {
        let catalog = catalog();
        let ctx = ctx(Tier::Basic);

        let result = catalog
            .invoke(
                SpecialistId::Technical,
                "provide_troubleshooting_steps",
                &ctx,
                json!({"issue_type": "login"}),
            )
            .await;
        assert!(result.output.contains("Caps Lock"));
        assert_eq!(ctx.troubleshooting_log(), vec!["login 유형 트러블슈팅 단계 제공함".to_string()]);

        catalog
            .invoke(
                SpecialistId::Technical,
                "run_diagnostic",
                &ctx,
                json!({"product_name": "앱", "issue_description": "느림"}),
            )
            .await;
        assert_eq!(ctx.troubleshooting_log().len(), 1);
    }

    #[tokio::test]
    async fn out_of_subset_and_malformed_calls_become_descriptions() {
        let catalog = catalog();
        let ctx = ctx(Tier::Basic);

        let foreign = catalog
            .invoke(
                SpecialistId::Technical,
                "process_refund",
                &ctx,
                json!({"refund_amount": 10, "reason": "x"}),
            )
            .await;
        assert!(!foreign.succeeded);
        assert!(foreign.output.contains("not available to the technical specialist"));

        let malformed = catalog
            .invoke(
                SpecialistId::Billing,
                "process_refund",
                &ctx,
                json!({"refund_amount": -5, "reason": "x"}),
            )
            .await;
        assert!(!malformed.succeeded);
        assert!(malformed.output.contains("greater than zero"));

        let missing =
            catalog.invoke(SpecialistId::Order, "lookup_order_status", &ctx, json!({})).await;
        assert!(!missing.succeeded);
    }

    struct DownedBackend;

    #[async_trait]
    impl Tool for DownedBackend {
        fn id(&self) -> ToolId {
            ToolId::LookupOrderStatus
        }

        async fn execute(&self, _ctx: &UserContext, _args: Value) -> Result<String, ToolError> {
            Err(ToolError::Backend {
                tool: ToolId::LookupOrderStatus,
                message: "order service timed out".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn backend_failure_is_reported_not_raised() {
        let mut catalog = catalog();
        catalog.register(DownedBackend);

        let result = catalog
            .invoke(
                SpecialistId::Order,
                "lookup_order_status",
                &ctx(Tier::Basic),
                json!({"order_number": "1"}),
            )
            .await;
        assert!(!result.succeeded);
        assert!(result.output.contains("order service timed out"));
    }

    #[tokio::test]
    async fn concurrent_troubleshooting_calls_are_all_logged() {
        let catalog = Arc::new(catalog());
        let ctx = Arc::new(ctx(Tier::Basic));

        let handles = (0..16)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    catalog
                        .invoke(
                            SpecialistId::Technical,
                            "provide_troubleshooting_steps",
                            &ctx,
                            json!({"issue_type": "crash"}),
                        )
                        .await
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert!(handle.await.expect("task").succeeded);
        }

        assert_eq!(ctx.troubleshooting_log().len(), 16);
    }
}
