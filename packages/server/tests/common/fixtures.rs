//! Test fixtures: a small dispatch world over the in-memory store.
//!
//! One property in Austin, one open issue, and two handymen who both cover it:
//! H1 by zip code with three specialties, H2 by radius with one. H1 always
//! outranks H2 when both are eligible.

use dispatch_core::domains::dispatch::{DispatchOrchestrator, DispatchAssignment};
use dispatch_core::domains::handymen::{CoverageArea, CoverageType, Handyman};
use dispatch_core::domains::issues::{Issue, IssuePriority, Property};
use dispatch_core::kernel::test_dependencies::{InMemoryDispatchStore, MockMessageGateway};
use dispatch_core::kernel::TestDependencies;
use serde_json::json;

pub const DISPATCH_NUMBER: &str = "+15125550000";

pub const H1_PHONE: &str = "(512) 555-0101";
pub const H1_E164: &str = "+15125550101";

pub const H2_PHONE: &str = "512.555.0102";
pub const H2_E164: &str = "+15125550102";

pub const TEMPLATE: &str =
    "Hi {{handyman_name}}, {{issue_priority}} job at {{property_name}}: {{issue_title}}. Reply 1 to accept, 2 to decline.";

pub struct World {
    pub property: Property,
    pub issue: Issue,
    pub h1: Handyman,
    pub h2: Handyman,
    pub store: InMemoryDispatchStore,
}

impl World {
    /// Fully configured world: template and sender number are set.
    pub fn new() -> Self {
        Self::unconfigured()
            .with_setting("dispatchTemplate", json!(TEMPLATE))
            .with_setting("whatsappNumber", json!(DISPATCH_NUMBER))
    }

    /// Same data, but no settings at all.
    pub fn unconfigured() -> Self {
        let property = Property::builder()
            .name("Riverside Lofts")
            .address("100 Congress Ave")
            .city("Austin")
            .state("TX")
            .zip_code("78701")
            .build();

        let issue = Issue::builder()
            .property_id(property.id)
            .title("Leaking kitchen sink")
            .description("Water pooling under the cabinet")
            .priority(IssuePriority::High)
            .build();

        let h1 = handyman("Dana Reyes", H1_PHONE, &["plumbing", "electrical", "carpentry"]);
        let h2 = handyman("Sam Ortiz", H2_PHONE, &["plumbing"]);

        let store = InMemoryDispatchStore::new()
            .with_property(property.clone())
            .with_issue(issue.clone())
            .with_handyman(h1.clone())
            .with_handyman(h2.clone())
            .with_coverage(
                CoverageArea::builder()
                    .handyman_id(h1.id)
                    .area_type(CoverageType::ZipCode)
                    .value("78701")
                    .is_primary(true)
                    .build(),
            )
            .with_coverage(
                CoverageArea::builder()
                    .handyman_id(h2.id)
                    .area_type(CoverageType::Radius)
                    .value("Austin, TX")
                    .radius_miles(25.0)
                    .priority(2)
                    .build(),
            );

        Self {
            property,
            issue,
            h1,
            h2,
            store,
        }
    }

    pub fn with_setting(mut self, key: &str, value: serde_json::Value) -> Self {
        self.store = self.store.with_setting(key, value);
        self
    }

    pub fn with_assignment(mut self, assignment: DispatchAssignment) -> Self {
        self.store = self.store.with_assignment(assignment);
        self
    }

    pub fn deps(&self) -> TestDependencies {
        TestDependencies::new(self.store.clone())
    }

    pub fn deps_with_gateway(&self, gateway: MockMessageGateway) -> TestDependencies {
        TestDependencies::new(self.store.clone()).with_gateway(gateway)
    }

    pub fn orchestrator(&self) -> (DispatchOrchestrator, TestDependencies) {
        let deps = self.deps();
        (DispatchOrchestrator::new(deps.server_deps()), deps)
    }
}

pub fn handyman(name: &str, phone: &str, specialties: &[&str]) -> Handyman {
    Handyman::builder()
        .name(name)
        .phone(phone)
        .specialties(specialties.iter().map(|s| s.to_string()).collect())
        .build()
}
