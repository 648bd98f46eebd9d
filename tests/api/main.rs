mod auth;
mod broadcasts;
mod cache;
mod catalog;
mod health_check;
mod helpers;
mod issues;
mod subscriptions;
mod users;
mod videos;
