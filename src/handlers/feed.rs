/// Feed endpoints
///
/// GET  /feed                                 - personalized main feed
/// GET  /feed/following                       - followed-creators feed
/// GET  /feed/categories/{category}           - category feed (auth optional)
/// POST /feed/refresh                         - drop the cached main batch
/// POST /feed/categories/{category}/refresh   - drop a cached category batch
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::{optional_user, JwtAuthMiddleware, UserId};
use crate::models::FeedScope;
use crate::services::FeedService;

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
    pub language: Option<String>,
}

const DEFAULT_PAGE_LIMIT: usize = 20;

pub async fn get_main_feed(
    service: web::Data<Arc<FeedService>>,
    user: UserId,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    let page = service
        .get_page(
            Some(user.0),
            FeedScope::Main,
            query.language.clone(),
            query.cursor.clone(),
            query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn get_following_feed(
    service: web::Data<Arc<FeedService>>,
    user: UserId,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    let page = service
        .get_page(
            Some(user.0),
            FeedScope::Following,
            None,
            query.cursor.clone(),
            query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Category feeds serve anonymous callers too; a valid bearer token adds
/// personalization (history suppression, interaction flags).
pub async fn get_category_feed(
    req: HttpRequest,
    service: web::Data<Arc<FeedService>>,
    path: web::Path<String>,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    let category = path.into_inner();
    let page = service
        .get_page(
            optional_user(&req),
            FeedScope::Category(category),
            query.language.clone(),
            query.cursor.clone(),
            query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn refresh_main_feed(
    service: web::Data<Arc<FeedService>>,
    user: UserId,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    service
        .refresh(Some(user.0), FeedScope::Main, query.language.clone())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn refresh_category_feed(
    req: HttpRequest,
    service: web::Data<Arc<FeedService>>,
    path: web::Path<String>,
    query: web::Query<FeedQueryParams>,
) -> Result<HttpResponse> {
    let category = path.into_inner();
    service
        .refresh(
            optional_user(&req),
            FeedScope::Category(category),
            query.language.clone(),
        )
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    // Category routes are registered at their full paths, ahead of the
    // JWT-wrapped scope, so they keep serving anonymous callers.
    cfg.service(
        web::resource("/feed/categories/{category}/refresh")
            .route(web::post().to(refresh_category_feed)),
    )
    .service(
        web::resource("/feed/categories/{category}").route(web::get().to(get_category_feed)),
    )
    .service(
        web::scope("/feed")
            .wrap(JwtAuthMiddleware)
            .route("", web::get().to(get_main_feed))
            .route("/following", web::get().to(get_following_feed))
            .route("/refresh", web::post().to(refresh_main_feed)),
    );
}
