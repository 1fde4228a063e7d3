//! Statement execution and result streaming.

pub mod prepared;
pub mod results;
pub mod statement;

pub use prepared::PreparedStatement;
pub use results::RowStream;
pub use statement::ExecOpts;
