pub mod allocator;
pub mod manager;
pub mod orchestrator;
pub mod pnr;
pub mod promoter;

pub use allocator::{Allocator, Claim};
pub use manager::{
    AvailabilityView, BookingConfig, BookingManager, BookingReceipt, BookingRequest, CancellationReport,
    StationRef, TicketDetails,
};
pub use orchestrator::{MockPaymentGateway, PaymentOrchestrator};
pub use pnr::generate_pnr;
pub use promoter::{ReleaseReport, WaitlistPromoter};
