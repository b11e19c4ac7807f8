//! `ledgerbridge` core: the request/response model, ledger identity types,
//! workflow parameter schemas and JSON flattening.

pub mod fields;
pub mod flatten;
pub mod hash;
pub mod messages;
pub mod schema;
pub mod types;

pub use fields::FieldMap;
pub use flatten::flatten_with_dot_notation;
pub use messages::{
    BusRequest, BusResponse, Confirmation, ConfirmationKind, ErrorCause, ErrorKind,
    ErrorResponse, FlowOutput, InvocationState, InvokeWithEntity, InvokeWithoutEntity,
    QueryEntityState, RequestKind, StateOutput,
};
pub use schema::{ArgValue, CoercionError, ConstructorSchema, ParamDef, ParamType};
pub use types::{EntityId, Party, TransactionHash};

