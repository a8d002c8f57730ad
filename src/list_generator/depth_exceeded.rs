//! DepthExceeded strategy: the stub that refuses to list.

use crate::sql_ir::{PlpgsqlStmt, DEPTH_ERRCODE, DEPTH_EXCEEDED_MESSAGE};

use super::ListFunctionParts;

pub(crate) fn build() -> ListFunctionParts {
    ListFunctionParts {
        declarations: Vec::new(),
        body: vec![PlpgsqlStmt::Raise {
            message: DEPTH_EXCEEDED_MESSAGE.to_string(),
            errcode: DEPTH_ERRCODE.to_string(),
        }],
    }
}
