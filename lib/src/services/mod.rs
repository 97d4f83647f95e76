// lib/src/services/mod.rs
// One service per workflow, all sharing the same store. `CareServices` wires
// them together so the HTTP layer holds a single handle.

use std::sync::Arc;

use crate::store::MemoryStore;

pub mod ancillary;
pub mod assignments;
pub mod beds;
pub mod catalog;
pub mod consultations;
pub mod dossiers;
pub mod payments;
pub mod pharmacy;
pub mod prescriptions;
pub mod pricing;
pub mod registration;
pub mod users;

pub use ancillary::AncillaryService;
pub use assignments::AssignmentManager;
pub use beds::BedService;
pub use catalog::CatalogService;
pub use consultations::ConsultationService;
pub use dossiers::DossierService;
pub use payments::PaymentLedger;
pub use pharmacy::PharmacyService;
pub use prescriptions::PrescriptionService;
pub use pricing::PricingRegistry;
pub use registration::RegistrationService;
pub use users::UserDirectory;

/// The full service registry over one shared store.
#[derive(Debug, Clone)]
pub struct CareServices {
    pub users: UserDirectory,
    pub registration: RegistrationService,
    pub payments: PaymentLedger,
    pub assignments: AssignmentManager,
    pub dossiers: DossierService,
    pub consultations: ConsultationService,
    pub ancillary: AncillaryService,
    pub pricing: PricingRegistry,
    pub pharmacy: PharmacyService,
    pub prescriptions: PrescriptionService,
    pub beds: BedService,
    pub catalog: CatalogService,
}

impl CareServices {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        CareServices {
            users: UserDirectory::new(Arc::clone(&store)),
            registration: RegistrationService::new(Arc::clone(&store)),
            payments: PaymentLedger::new(Arc::clone(&store)),
            assignments: AssignmentManager::new(Arc::clone(&store)),
            dossiers: DossierService::new(Arc::clone(&store)),
            consultations: ConsultationService::new(Arc::clone(&store)),
            ancillary: AncillaryService::new(Arc::clone(&store)),
            pricing: PricingRegistry::new(Arc::clone(&store)),
            pharmacy: PharmacyService::new(Arc::clone(&store)),
            prescriptions: PrescriptionService::new(Arc::clone(&store)),
            beds: BedService::new(Arc::clone(&store)),
            catalog: CatalogService::new(store),
        }
    }
}
