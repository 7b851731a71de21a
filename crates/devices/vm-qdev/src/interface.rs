//! 能力接口分发
//!
//! 类型在注册时声明自己实现的接口（有序集合）。每个接口是一张由可选方法槽
//! 组成的表；调用方按节点的具体类型取出接口表，方法存在则调用，缺失则按接口
//! 约定视为空操作或"始终支持"。
//!
//! 接口表以 `Arc<dyn Any + Send + Sync>` 存放，按接口的具体类型向下转换。

use crate::error::{QdevError, QdevResult};
use crate::tree::{DeviceTree, NodeId};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// 能力接口
///
/// 实现者是一张方法表（通常是若干 `Option<Arc<dyn Fn ...>>` 字段）。
pub trait Interface: Any + Send + Sync {
    /// 接口名称，在整个类型系统中唯一
    const NAME: &'static str;
}

#[derive(Clone)]
struct InterfaceEntry {
    name: &'static str,
    table: Arc<dyn Any + Send + Sync>,
}

/// 某个类型实现的接口集合，保持声明顺序
#[derive(Clone, Default)]
pub struct InterfaceTable {
    entries: Vec<InterfaceEntry>,
}

impl InterfaceTable {
    /// 创建空接口集合
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明实现接口 `I`；重复声明时原位替换
    pub fn implement<I: Interface>(&mut self, table: I) -> &mut Self {
        let entry = InterfaceEntry {
            name: I::NAME,
            table: Arc::new(table),
        };
        match self.entries.iter_mut().find(|e| e.name == I::NAME) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// 取接口 `I` 的方法表
    pub fn get<I: Interface>(&self) -> Option<Arc<I>> {
        self.entries
            .iter()
            .find(|e| e.name == I::NAME)
            .and_then(|e| Arc::clone(&e.table).downcast::<I>().ok())
    }

    /// 是否实现了名为 `name` 的接口
    pub fn implements(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// 按声明顺序列出接口名
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }

    /// 以父类型的接口为基础，叠加本类型的声明
    pub(crate) fn inherit_from(&mut self, parent: &InterfaceTable) {
        let mut merged = parent.entries.clone();
        for entry in self.entries.drain(..) {
            match merged.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => *existing = entry,
                None => merged.push(entry),
            }
        }
        self.entries = merged;
    }
}

impl fmt::Debug for InterfaceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl DeviceTree {
    /// 取节点具体类型的接口 `I`
    ///
    /// 节点类型未实现该接口属于编程错误，以 `MissingInterface` 立即返回。
    pub fn interface_of<I: Interface>(&self, node: NodeId) -> QdevResult<Arc<I>> {
        let type_name = self.type_name_of(node)?;
        self.types()
            .get(type_name)?
            .interfaces()
            .get::<I>()
            .ok_or_else(|| QdevError::MissingInterface {
                type_name: type_name.to_string(),
                interface: I::NAME,
            })
    }

    /// 节点是否实现接口 `I`；节点不存在时返回 false
    pub fn implements<I: Interface>(&self, node: NodeId) -> bool {
        self.interface_of::<I>(node).is_ok()
    }
}
