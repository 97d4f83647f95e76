// models/src/lib.rs
// Domain entities and the shared error taxonomy for the care-episode core.

pub mod assignments;
pub mod catalog;
pub mod consultations;
pub mod dossiers;
pub mod errors;
pub mod lab_results;
pub mod patients;
pub mod payments;
pub mod prescriptions;
pub mod pricing;
pub mod principal;
pub mod requests;
pub mod users;

pub use assignments::{AssignmentStatus, DoctorAssignment};
pub use catalog::{Bed, CatalogExam, PharmacyProduct};
pub use consultations::{Consultation, ConsultationDraft, ConsultationStatus};
pub use dossiers::{ConsultationDossier, DossierStatus};
pub use errors::{CareError, CareResult};
pub use lab_results::{LabResult, LabResultStatus};
pub use patients::{Gender, NewPatient, Patient};
pub use payments::{Payment, PaymentItem, PaymentKind, PaymentMethod, PaymentStatus};
pub use prescriptions::{
    NewPrescriptionItem, Prescription, PrescriptionItem, PrescriptionStatus,
};
pub use pricing::ConsultationPrice;
pub use principal::{Principal, Role};
pub use requests::{
    AncillaryKind, AncillaryRequest, EffectiveStatus, RequestExam, RequestStatus,
    effective_status,
};
pub use users::{Login, NewUser, User};
