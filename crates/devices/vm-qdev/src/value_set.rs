//! 值集合（ValueSet）
//!
//! 描述一个插槽选项允许的取值：单个标量，或由标量/闭区间组成的列表。
//!
//! 规范形式：
//! - 恰好含一个标量元素的集合以裸标量形式存储和显示；
//! - 其它集合一律以列表形式存储；
//! - 列表中的两元素列表 `[low, high]` 表示闭区间，端点必须同为数字或同为字符串；
//! - 列表中的单元素列表 `[x]` 表示字面值 `x` 本身（用于表达列表型取值）。
//!
//! 列表以 `Arc<[SlotValue]>` 共享，`extend` 采用写时复制，克隆开销恒定。
//! 相邻区间不会自动合并。

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// 插槽选项中的单个值
///
/// 序列化形状与管理协议一致：`null`、布尔、数字、字符串或列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    /// 空值
    Null,
    /// 布尔值
    Bool(bool),
    /// 数字（整数或浮点）
    Number(serde_json::Number),
    /// 字符串
    String(String),
    /// 列表（区间、字面值包装或完整的值列表）
    List(Arc<[SlotValue]>),
}

impl SlotValue {
    /// 构造闭区间元素 `[low, high]`
    pub fn range(low: impl Into<SlotValue>, high: impl Into<SlotValue>) -> Self {
        SlotValue::List(Arc::from(vec![low.into(), high.into()]))
    }

    /// 构造列表
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SlotValue>,
    {
        SlotValue::List(items.into_iter().map(Into::into).collect())
    }

    /// 是否为标量（非列表）
    pub fn is_scalar(&self) -> bool {
        !matches!(self, SlotValue::List(_))
    }
}

impl From<bool> for SlotValue {
    fn from(v: bool) -> Self {
        SlotValue::Bool(v)
    }
}

impl From<i64> for SlotValue {
    fn from(v: i64) -> Self {
        SlotValue::Number(v.into())
    }
}

impl From<i32> for SlotValue {
    fn from(v: i32) -> Self {
        SlotValue::Number(i64::from(v).into())
    }
}

impl From<u32> for SlotValue {
    fn from(v: u32) -> Self {
        SlotValue::Number(u64::from(v).into())
    }
}

impl From<u64> for SlotValue {
    fn from(v: u64) -> Self {
        SlotValue::Number(v.into())
    }
}

impl From<&str> for SlotValue {
    fn from(v: &str) -> Self {
        SlotValue::String(v.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(v: String) -> Self {
        SlotValue::String(v)
    }
}

impl From<Vec<SlotValue>> for SlotValue {
    fn from(v: Vec<SlotValue>) -> Self {
        SlotValue::List(Arc::from(v))
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

/// 按自然顺序比较两个同类标量；只有数字与字符串可排序
fn compare_ordered(a: &SlotValue, b: &SlotValue) -> Option<Ordering> {
    match (a, b) {
        (SlotValue::Number(x), SlotValue::Number(y)) => compare_numbers(x, y),
        (SlotValue::String(x), SlotValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn scalar_eq(a: &SlotValue, b: &SlotValue) -> bool {
    match (a, b) {
        (SlotValue::Number(x), SlotValue::Number(y)) => {
            compare_numbers(x, y) == Some(Ordering::Equal)
        }
        _ => a == b,
    }
}

/// 判断值列表中的单个元素是否包含 `v`
fn element_contains(element: &SlotValue, v: &SlotValue) -> bool {
    match element {
        SlotValue::List(items) => match items.as_ref() {
            [literal] => literal == v,
            [low, high] => {
                let low_ok = matches!(
                    compare_ordered(low, v),
                    Some(Ordering::Less | Ordering::Equal)
                );
                let high_ok = matches!(
                    compare_ordered(v, high),
                    Some(Ordering::Less | Ordering::Equal)
                );
                low_ok && high_ok
            }
            _ => false,
        },
        scalar => scalar_eq(scalar, v),
    }
}

/// 插槽选项的取值集合
///
/// 相等性按规范化为列表后的结构相等判断，因此 `5` 与 `[5]` 相等，
/// 但区间 `[1, 3]` 与列表 `[1, 2, 3]` 不相等。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueSet(SlotValue);

impl ValueSet {
    /// 按原样包装一个值
    pub fn new(value: impl Into<SlotValue>) -> Self {
        ValueSet(value.into())
    }

    /// 空集合
    pub fn empty() -> Self {
        ValueSet(SlotValue::List(Arc::from(Vec::new())))
    }

    /// 由元素列表构造，并化简为规范形式
    pub fn from_elements<I, V>(elements: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SlotValue>,
    {
        Self::simplify(elements.into_iter().map(Into::into).collect())
    }

    /// 规范化为列表
    ///
    /// 已是列表时共享同一份存储，否则包装为单元素列表。
    pub fn normalize(&self) -> Arc<[SlotValue]> {
        match &self.0 {
            SlotValue::List(items) => Arc::clone(items),
            scalar => Arc::from(vec![scalar.clone()]),
        }
    }

    /// 化简：唯一元素为标量时返回裸标量，否则保留列表
    pub fn simplify(list: Arc<[SlotValue]>) -> Self {
        match list.as_ref() {
            [only] if only.is_scalar() => ValueSet(only.clone()),
            _ => ValueSet(SlotValue::List(list)),
        }
    }

    /// 集合是否包含 `v`
    ///
    /// 不支持的元素形状（空列表、三个以上元素的列表、类型不一致的区间）
    /// 视为不匹配。
    pub fn contains(&self, v: &SlotValue) -> bool {
        self.normalize().iter().any(|e| element_contains(e, v))
    }

    /// 追加 `addition` 的全部元素并重新化简
    ///
    /// 保持顺序，不去重，不合并区间。
    pub fn extend(&mut self, addition: &ValueSet) {
        let mut elements = self.normalize().to_vec();
        elements.extend(addition.normalize().iter().cloned());
        *self = Self::simplify(Arc::from(elements));
    }

    /// 底层值（规范形式）
    pub fn value(&self) -> &SlotValue {
        &self.0
    }

    /// 是否以裸标量形式存储
    pub fn is_scalar(&self) -> bool {
        self.0.is_scalar()
    }

    /// 规范化后的元素个数
    pub fn len(&self) -> usize {
        match &self.0 {
            SlotValue::List(items) => items.len(),
            _ => 1,
        }
    }

    /// 是否为空集合
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.normalize() == other.normalize()
    }
}

impl From<SlotValue> for ValueSet {
    fn from(value: SlotValue) -> Self {
        ValueSet(value)
    }
}

impl From<&str> for ValueSet {
    fn from(value: &str) -> Self {
        ValueSet(value.into())
    }
}

impl fmt::Display for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
