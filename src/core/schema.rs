//! 行类型定义
//!
//! 表达式节点输出的行类型：有序的命名字段列表，创建后不可变。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 字段数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    BigInt,
    Double,
    Decimal,
    Varchar,
    Date,
    Timestamp,
    Any,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "BOOLEAN",
            DataType::Int => "INTEGER",
            DataType::BigInt => "BIGINT",
            DataType::Double => "DOUBLE",
            DataType::Decimal => "DECIMAL",
            DataType::Varchar => "VARCHAR",
            DataType::Date => "DATE",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Any => "ANY",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// 行类型
///
/// 节点之间共享，使用 `Arc` 避免在复制节点时重复分配。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RowType {
    fields: Vec<Field>,
}

pub type RowTypeRef = Arc<RowType>;

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// 便捷构造：(名称, 类型) 列表
    pub fn of(fields: &[(&str, DataType)]) -> Self {
        Self::new(
            fields
                .iter()
                .map(|(name, data_type)| Field::new(*name, *data_type))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// 拼接两个行类型（连接节点的输出）
    pub fn concat(&self, other: &RowType) -> RowType {
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        RowType::new(fields)
    }

    /// 判断两个行类型在字段数量和类型上是否一致（忽略字段名和可空性）
    ///
    /// 等价表达式只要求类型兼容，规则改写后字段名可能不同。
    pub fn is_equivalent(&self, other: &RowType) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordType(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", field.data_type, field.name)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_type_concat() {
        let left = RowType::of(&[("id", DataType::Int)]);
        let right = RowType::of(&[("name", DataType::Varchar), ("age", DataType::Int)]);
        let joined = left.concat(&right);
        assert_eq!(joined.field_count(), 3);
        assert_eq!(joined.field_names(), vec!["id", "name", "age"]);
    }

    #[test]
    fn test_row_type_equivalence_ignores_names() {
        let a = RowType::of(&[("a", DataType::Int), ("b", DataType::Varchar)]);
        let b = RowType::of(&[("x", DataType::Int), ("y", DataType::Varchar)]);
        let c = RowType::of(&[("x", DataType::Int)]);
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_row_type_display() {
        let row_type = RowType::of(&[("id", DataType::BigInt)]);
        assert_eq!(row_type.to_string(), "RecordType(BIGINT id)");
    }
}
