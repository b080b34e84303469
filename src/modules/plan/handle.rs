use actix_web::{get, web, HttpRequest};

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::plan::{
        model::{Plan, SubscriptionPlan, PLANS},
        service::PlanService,
    },
};

#[get("/plans")]
pub async fn list_plans() -> Result<success::Success<&'static [Plan]>, error::Error> {
    Ok(success::Success::ok(Some(&PLANS[..])))
}

#[get("/plan")]
pub async fn get_subscription_plan(
    plan_service: web::Data<PlanService>,
    req: HttpRequest,
) -> Result<success::Success<SubscriptionPlan>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let plan = plan_service.subscription_for(&user_id).await?;
    Ok(success::Success::ok(Some(plan)))
}
