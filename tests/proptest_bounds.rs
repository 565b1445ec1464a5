//! Property-based tests for discovery coverage.
//!
//! These tests verify:
//! - Every point strictly inside the search disc falls in some planned bound
//! - Plans respect the cell budget whenever a precision above 1 is chosen
//! - End to end, a circle inside the radius is always found and nothing
//!   outside the radius is ever returned

mod helpers;

use circles_core::discovery::BoundsPlanner;
use circles_core::location::{destination, geohash, haversine_distance, GeoPoint};
use circles_core::VisibilityFilter;
use helpers::{located, user, TestEnv};
use proptest::prelude::*;

fn center_strategy() -> impl Strategy<Value = GeoPoint> {
    (-89.0_f64..89.0, -180.0_f64..=180.0)
        .prop_map(|(lat, lng)| GeoPoint::new(lat, lng).expect("in range"))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Points at up to 99.9% of the radius, in any direction, are covered.
    #[test]
    fn planned_bounds_cover_the_disc(
        center in center_strategy(),
        radius in 1.0_f64..50_000.0,
        bearing in 0.0_f64..360.0,
        fraction in 0.0_f64..0.999,
    ) {
        let target = destination(center, bearing, radius * fraction);
        let plan = BoundsPlanner::default().plan(center, radius).unwrap();
        let hash = geohash::encode(target, 10).unwrap();

        prop_assert!(
            plan.bounds.iter().any(|b| b.contains(&hash)),
            "{target} ({hash}) not covered around {center} r={radius}: {:?}",
            plan.bounds
        );
    }

    /// The planner stays within its budget unless it fell back to precision 1.
    #[test]
    fn plans_respect_cell_budget(
        center in center_strategy(),
        radius in 1.0_f64..50_000.0,
    ) {
        let planner = BoundsPlanner::default();
        let plan = planner.plan(center, radius).unwrap();

        prop_assert!(!plan.bounds.is_empty());
        prop_assert!(plan.bounds.len() <= plan.cell_count);
        if plan.precision > 1 {
            prop_assert!(plan.cell_count <= 9, "{} cells", plan.cell_count);
        }
        for bound in &plan.bounds {
            prop_assert!(bound.start <= bound.end);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A circle planted inside the radius is always returned; everything
    /// returned is inside the radius.
    #[test]
    fn discovery_finds_inside_and_only_inside(
        center in center_strategy(),
        radius in 10.0_f64..20_000.0,
        bearing in 0.0_f64..360.0,
        inside in 0.0_f64..0.999,
        outside in 1.01_f64..3.0,
    ) {
        let env = TestEnv::new();
        let alice = user("alice");
        let near_point = destination(center, bearing, radius * inside);
        let far_point = destination(center, bearing, radius * outside);

        let found = runtime().block_on(async {
            let near = env
                .core
                .create_circle(&alice, located("near", near_point))
                .await
                .unwrap();
            env.core
                .create_circle(&alice, located("far", far_point))
                .await
                .unwrap();
            let found = env
                .core
                .discover_nearby(center, radius, &VisibilityFilter::Public)
                .await
                .unwrap();
            (near.id, found)
        });

        let (near_id, found) = found;
        prop_assert!(found.iter().any(|n| n.circle.id == near_id));
        for nearby in &found {
            prop_assert!(nearby.distance_meters <= radius);
            let point = nearby.circle.location.as_ref().unwrap().point();
            prop_assert!(haversine_distance(center, point) <= radius);
        }
    }
}

#[test]
fn covers_both_sides_of_the_antimeridian() {
    let center = GeoPoint::new(10.0, 179.99).unwrap();
    let plan = BoundsPlanner::default().plan(center, 5_000.0).unwrap();

    for lng in [179.995, -179.97] {
        let hash = geohash::encode(GeoPoint::new(10.0, lng).unwrap(), 10).unwrap();
        assert!(
            plan.bounds.iter().any(|b| b.contains(&hash)),
            "{lng} not covered"
        );
    }
}
