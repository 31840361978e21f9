use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

// set in request extensions by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

pub type KeyExtractor = fn(&Request) -> String;

pub fn user_key(req: &Request) -> String {
    match req.extensions().get::<AuthenticatedUser>() {
        Some(AuthenticatedUser(id)) => format!("user:{id}"),
        None => ip_key(req),
    }
}

pub fn ip_key(req: &Request) -> String {
    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}
