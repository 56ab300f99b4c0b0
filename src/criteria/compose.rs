//! A criterion made of other criteria

use super::{Criterion, CriterionRef, RepositoryContext};
use crate::core::error::RepoResult;
use crate::core::query::Query;
use async_trait::async_trait;
use std::sync::Arc;

/// Applies its members in insertion order, each one receiving the query
/// produced by the previous one
///
/// Null criteria are never stored.
#[derive(Debug, Clone, Default)]
pub struct ComposeCriteria {
    criteria: Vec<CriterionRef>,
}

impl ComposeCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_criteria(criteria: impl IntoIterator<Item = CriterionRef>) -> Self {
        let mut compose = Self::new();
        for criterion in criteria {
            compose.push_ref(criterion);
        }
        compose
    }

    pub fn push(&mut self, criterion: impl Criterion + 'static) -> &mut Self {
        self.push_ref(Arc::new(criterion))
    }

    pub fn push_ref(&mut self, criterion: CriterionRef) -> &mut Self {
        if !criterion.is_null() {
            self.criteria.push(criterion);
        }
        self
    }

    /// Push `criterion` only when `condition` holds
    pub fn when(&mut self, condition: bool, criterion: impl Criterion + 'static) -> &mut Self {
        if condition {
            self.push(criterion);
        }
        self
    }

    pub fn criteria(&self) -> &[CriterionRef] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

#[async_trait]
impl Criterion for ComposeCriteria {
    async fn apply(&self, query: Query, repository: &dyn RepositoryContext) -> RepoResult<Query> {
        let mut query = query;
        for criterion in &self.criteria {
            query = criterion.apply(query, repository).await?;
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::{Condition, SortDirection};
    use crate::criteria::testing::StaticContext;
    use crate::criteria::{FieldIsValue, GreaterThan, NullCriterion, OrderBy};

    #[tokio::test]
    async fn test_applies_in_order() {
        let context = StaticContext::new("products");
        let mut compose = ComposeCriteria::new();
        compose
            .push(FieldIsValue::new("status", 1))
            .push(GreaterThan::new("price", 100))
            .push(OrderBy::desc("price"));

        let query = compose.apply(context.query(), &context).await.unwrap();
        let expected = context
            .query()
            .where_eq("status", 1)
            .where_op("price", crate::core::query::Operator::Gt, 100)
            .order_by("price", SortDirection::Desc);
        assert_eq!(query, expected);
    }

    #[test]
    fn test_null_and_false_conditions_are_dropped() {
        let mut compose = ComposeCriteria::new();
        compose
            .push(NullCriterion)
            .when(false, FieldIsValue::new("status", 1))
            .when(true, FieldIsValue::new("status", 2));

        assert_eq!(compose.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_compose_is_identity() {
        let context = StaticContext::new("products");
        let query = context.query().where_eq("a", 1);
        let applied = ComposeCriteria::from_criteria(vec![NullCriterion::shared()])
            .apply(query.clone(), &context)
            .await
            .unwrap();
        assert_eq!(applied, query);
        assert!(matches!(applied.wheres()[0].condition, Condition::Compare { .. }));
    }
}
