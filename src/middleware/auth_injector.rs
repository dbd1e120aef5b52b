// auth_injector.rs
// 在请求发往 provider 之前注入认证信息
use crate::config::BasicAuthCredentials;

pub trait AuthInjector: Send + Sync {
    fn inject(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

pub struct BasicAuthInjector {
    credentials: BasicAuthCredentials,
}

impl BasicAuthInjector {
    pub fn new(credentials: BasicAuthCredentials) -> Self {
        Self { credentials }
    }
}

impl AuthInjector for BasicAuthInjector {
    fn inject(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.basic_auth(&self.credentials.user, Some(&self.credentials.password))
    }
}
