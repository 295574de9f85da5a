use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

impl CategoryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Expense category with its general-ledger code. Drafts created for a
/// category inherit its `gl_code` for downstream export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub gl_code: String,
}

#[cfg(test)]
mod tests {
    use super::{Category, CategoryId};

    #[test]
    fn category_carries_gl_code() {
        let category = Category {
            id: CategoryId("C-1".to_string()),
            name: "Travel".to_string(),
            gl_code: "6200".to_string(),
        };
        assert_eq!(category.gl_code, "6200");
    }
}
