// State machine for delivery ledger entries
//
// The transition table is enforced by the ledger's conditional writes; this
// module only names the states and which moves are legal.

pub mod states;

pub use states::DeliveryStatus;
