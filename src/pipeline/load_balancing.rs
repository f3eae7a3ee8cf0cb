//! Load balancing stage.
//!
//! # Responsibilities
//! - Resolve the route's balancer from the house
//! - Lease an endpoint and point the downstream target at it
//! - Run the rest of the pipeline, then release the lease on every exit path

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use futures_util::future::{BoxFuture, FutureExt};
use crate::load_balancer::LoadBalancerHouse;
use crate::pipeline::{BalancingState, DownstreamContext, Stage};

/// Pipeline stage that leases a downstream endpoint around the next stage.
pub struct LoadBalancingStage<X> {
    house: Arc<LoadBalancerHouse>,
    next: Box<dyn Stage<X>>,
}

impl<X> LoadBalancingStage<X> {
    pub fn new(house: Arc<LoadBalancerHouse>, next: impl Stage<X> + 'static) -> Self {
        Self {
            house,
            next: Box::new(next),
        }
    }
}

impl<X: Send + 'static> Stage<X> for LoadBalancingStage<X> {
    fn invoke<'a>(&'a self, ctx: &'a mut DownstreamContext<X>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let balancer = match self.house.get(&ctx.route.key, &ctx.route.endpoints) {
                Ok(balancer) => balancer,
                Err(e) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        route = %ctx.route.key.route(),
                        error = %e,
                        "Error retrieving the load balancer, setting pipeline error"
                    );
                    ctx.state = BalancingState::ResolutionFailed;
                    ctx.set_pipeline_error(e);
                    return;
                }
            };
            ctx.state = BalancingState::Resolved;

            let lease = match balancer.lease() {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        route = %ctx.route.key.route(),
                        error = %e,
                        "Error leasing from the load balancer, setting pipeline error"
                    );
                    ctx.state = BalancingState::LeaseFailed;
                    ctx.set_pipeline_error(e);
                    return;
                }
            };
            ctx.state = BalancingState::Leased;

            ctx.target.apply(lease.endpoint());
            tracing::debug!(
                request_id = %ctx.request_id,
                endpoint = %lease.endpoint(),
                target = %ctx.target,
                "Downstream target rewritten"
            );

            ctx.state = BalancingState::Forwarded;
            // A cancelled request drops `lease`, which releases it. A panic
            // is caught here only so the release happens before it resumes.
            let outcome = AssertUnwindSafe(async { self.next.invoke(&mut *ctx).await })
                .catch_unwind()
                .await;

            lease.release();

            match outcome {
                Ok(()) => ctx.state = BalancingState::Released,
                Err(panic) => {
                    tracing::debug!(
                        request_id = %ctx.request_id,
                        "Panic in next stage, lease released, resuming unwind"
                    );
                    std::panic::resume_unwind(panic);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::discovery::{EndpointProvider, ServiceEndpoints};
    use crate::load_balancer::{BalancerOptions, Endpoint, LoadBalancer, LoadBalancerError, RouteKey};
    use crate::pipeline::{DownstreamRoute, DownstreamTarget, PipelineError};

    /// Next stage that runs a closure over the context.
    struct Probe<F>(F);

    impl<F> Stage<()> for Probe<F>
    where
        F: Fn(&mut DownstreamContext) + Send + Sync,
    {
        fn invoke<'a>(&'a self, ctx: &'a mut DownstreamContext) -> BoxFuture<'a, ()> {
            Box::pin(async move { (self.0)(ctx) })
        }
    }

    /// Next stage that never completes.
    struct Hang;

    impl Stage<()> for Hang {
        fn invoke<'a>(&'a self, _ctx: &'a mut DownstreamContext) -> BoxFuture<'a, ()> {
            Box::pin(std::future::pending())
        }
    }

    fn route(name: &str, kind: &str, endpoints: Vec<Endpoint>) -> (DownstreamRoute, Arc<ServiceEndpoints>) {
        let provider = Arc::new(ServiceEndpoints::new(name, endpoints));
        let endpoints: Arc<dyn EndpointProvider> = provider.clone();
        (
            DownstreamRoute::new(RouteKey::new(name, BalancerOptions::new(kind)), endpoints),
            provider,
        )
    }

    fn balancer_of(house: &LoadBalancerHouse, route: &DownstreamRoute) -> Arc<LoadBalancer> {
        house.get(&route.key, &route.endpoints).unwrap()
    }

    #[tokio::test]
    async fn test_rewrites_target_and_releases() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route(
            "R2",
            "least_outstanding",
            vec![Endpoint::new("h1", 80), Endpoint::new("h2", 80)],
        );
        let balancer = balancer_of(&house, &route);

        let probe_balancer = balancer.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();
        let stage = LoadBalancingStage::new(
            house.clone(),
            Probe(move |ctx: &mut DownstreamContext| {
                probe_calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(ctx.state, BalancingState::Forwarded);
                assert_eq!(ctx.target.host, "h1");
                assert_eq!(probe_balancer.total_outstanding(), 1);
            }),
        );

        let mut ctx = DownstreamContext::new(route, DownstreamTarget::new("http", "/orders"), ());
        stage.invoke(&mut ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.state, BalancingState::Released);
        assert!(!ctx.is_error());
        assert_eq!(ctx.target.to_uri().unwrap().to_string(), "http://h1:80/orders");
        assert_eq!(balancer.total_outstanding(), 0);
    }

    #[tokio::test]
    async fn test_round_robin_across_requests() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route(
            "R1",
            "round_robin",
            vec![Endpoint::new("h1", 80), Endpoint::new("h2", 80)],
        );
        let stage = LoadBalancingStage::new(house.clone(), Probe(|_: &mut DownstreamContext| {}));

        let mut hosts = Vec::new();
        for _ in 0..3 {
            let mut ctx = DownstreamContext::new(route.clone(), DownstreamTarget::new("http", "/"), ());
            stage.invoke(&mut ctx).await;
            hosts.push(ctx.target.host);
        }
        assert_eq!(hosts, vec!["h1", "h2", "h1"]);
        assert_eq!(house.len(), 1);
    }

    #[tokio::test]
    async fn test_lease_failure_stops_pipeline() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, provider) = route("R3", "round_robin", vec![Endpoint::new("h1", 80)]);
        balancer_of(&house, &route);
        provider.replace(Vec::new());

        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();
        let stage = LoadBalancingStage::new(
            house,
            Probe(move |_: &mut DownstreamContext| {
                probe_calls.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut ctx = DownstreamContext::new(route, DownstreamTarget::new("http", "/"), ());
        stage.invoke(&mut ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.state, BalancingState::LeaseFailed);
        assert!(ctx.target.host.is_empty());
        assert!(matches!(
            ctx.errors.as_slice(),
            [PipelineError::LoadBalancer(LoadBalancerError::NoEndpointsAvailable { .. })]
        ));
    }

    #[tokio::test]
    async fn test_resolution_failure_stops_pipeline() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route("R4", "sticky_magic", vec![Endpoint::new("h1", 80)]);

        let calls = Arc::new(AtomicUsize::new(0));
        let probe_calls = calls.clone();
        let stage = LoadBalancingStage::new(
            house.clone(),
            Probe(move |_: &mut DownstreamContext| {
                probe_calls.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut ctx = DownstreamContext::new(route, DownstreamTarget::new("http", "/"), ());
        stage.invoke(&mut ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.state, BalancingState::ResolutionFailed);
        assert_eq!(ctx.errors.len(), 1);
        assert!(matches!(
            &ctx.errors[0],
            PipelineError::LoadBalancer(LoadBalancerError::Creation { .. })
        ));
        assert!(house.is_empty());
    }

    #[tokio::test]
    async fn test_inherited_port() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route("R5", "no_balancing", vec![Endpoint::new("h3", 0)]);
        let stage = LoadBalancingStage::new(house, Probe(|_: &mut DownstreamContext| {}));

        let target = DownstreamTarget::from_uri(&"https://orig:8443/pay".parse().unwrap());
        let mut ctx = DownstreamContext::new(route, target, ());
        stage.invoke(&mut ctx).await;

        assert_eq!(ctx.target.host, "h3");
        assert_eq!(ctx.target.port, Some(8443));
    }

    #[tokio::test]
    async fn test_release_runs_before_panic_reaches_caller() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route(
            "R6",
            "least_outstanding",
            vec![Endpoint::new("h1", 80), Endpoint::new("h2", 80)],
        );
        let balancer = balancer_of(&house, &route);
        let stage = LoadBalancingStage::new(
            house,
            Probe(|_: &mut DownstreamContext| {
                panic!("downstream exploded");
            }),
        );

        let mut ctx = DownstreamContext::new(route, DownstreamTarget::new("http", "/"), ());
        let mut invocation = AssertUnwindSafe(stage.invoke(&mut ctx)).catch_unwind();
        let outcome = (&mut invocation).await;

        // The stage future is still alive here; only the stage's own release
        // can have brought the count back to zero.
        assert!(outcome.is_err());
        assert_eq!(balancer.total_outstanding(), 0);
        drop(invocation);

        assert_eq!(balancer.total_outstanding(), 0);
        assert_eq!(balancer.lease().unwrap().endpoint().host(), "h1");
    }

    #[tokio::test]
    async fn test_cancellation_releases() {
        let house = Arc::new(LoadBalancerHouse::new());
        let (route, _) = route("R7", "least_outstanding", vec![Endpoint::new("h1", 80)]);
        let balancer = balancer_of(&house, &route);
        let stage = LoadBalancingStage::new(house, Hang);

        let mut ctx = DownstreamContext::new(route, DownstreamTarget::new("http", "/"), ());
        let timed_out = tokio::time::timeout(Duration::from_millis(20), stage.invoke(&mut ctx)).await;

        assert!(timed_out.is_err());
        assert_eq!(ctx.state, BalancingState::Forwarded);
        assert_eq!(balancer.total_outstanding(), 0);
    }
}
