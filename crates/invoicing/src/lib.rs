//! Dues invoicing: coverage-period invoices issued against a member's dues
//! schedule, with payment registration and voiding.

pub mod invoice;

pub use invoice::{
    DuesInvoice, DuesInvoiceCommand, DuesInvoiceEvent, InvoiceId, InvoiceStatus, IssueInvoice,
    RegisterPayment, VoidInvoice,
};
