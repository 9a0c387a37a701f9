//! IP allow/deny filtering. The deny list is checked first; an empty
//! list means no restriction for that list.

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::net::IpAddr;

use crate::config::IpFilterConfig;
use crate::pipeline::{ErrorCode, Rejection, RequestContext, Stage, StageOutcome};

pub struct IpFilter {
    allow: Vec<IpAddr>,
    deny: Vec<IpAddr>,
}

impl IpFilter {
    pub fn from_config(config: &IpFilterConfig) -> Self {
        // Invalid entries are dropped here; validation reports them at load.
        Self {
            allow: config
                .allow
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect(),
            deny: config.deny.iter().filter_map(|s| s.parse().ok()).collect(),
        }
    }

    pub fn check(&self, ip: IpAddr) -> Result<(), Rejection> {
        if self.deny.contains(&ip) {
            return Err(Rejection::new(
                StatusCode::FORBIDDEN,
                ErrorCode::IpBlacklisted,
                "Access denied",
            ));
        }
        if !self.allow.is_empty() && !self.allow.contains(&ip) {
            return Err(Rejection::new(
                StatusCode::FORBIDDEN,
                ErrorCode::IpNotWhitelisted,
                "Access restricted",
            ));
        }
        Ok(())
    }
}

pub struct IpFilterStage {
    filter: IpFilter,
}

impl IpFilterStage {
    pub fn new(filter: IpFilter) -> Self {
        Self { filter }
    }
}

impl Stage for IpFilterStage {
    fn name(&self) -> &'static str {
        "ip_filter"
    }

    fn apply<'a>(&'a self, ctx: RequestContext) -> BoxFuture<'a, StageOutcome> {
        async move {
            match self.filter.check(ctx.client_ip) {
                Ok(()) => StageOutcome::Continue(ctx),
                Err(rejection) => {
                    tracing::warn!(
                        target: "audit",
                        client = %ctx.client_ip,
                        path = %ctx.path,
                        code = rejection.code.as_str(),
                        "Perimeter block"
                    );
                    StageOutcome::Reject(rejection)
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(allow: &[&str], deny: &[&str]) -> IpFilter {
        IpFilter::from_config(&IpFilterConfig {
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn empty_lists_allow_everyone() {
        assert!(filter(&[], &[]).check("1.2.3.4".parse().unwrap()).is_ok());
    }

    #[test]
    fn deny_list_blocks() {
        let err = filter(&[], &["1.2.3.4"])
            .check("1.2.3.4".parse().unwrap())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IpBlacklisted);
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn deny_wins_over_allow() {
        let err = filter(&["1.2.3.4"], &["1.2.3.4"])
            .check("1.2.3.4".parse().unwrap())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::IpBlacklisted);
    }

    #[test]
    fn allow_list_excludes_others() {
        let f = filter(&["5.6.7.8"], &[]);
        assert!(f.check("5.6.7.8".parse().unwrap()).is_ok());
        let err = f.check("9.9.9.9".parse().unwrap()).unwrap_err();
        assert_eq!(err.code, ErrorCode::IpNotWhitelisted);
    }

    #[test]
    fn ipv6_entries_work() {
        let f = filter(&[], &["::1"]);
        assert!(f.check("::1".parse().unwrap()).is_err());
        assert!(f.check("::2".parse().unwrap()).is_ok());
    }
}
