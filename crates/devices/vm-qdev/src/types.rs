//! 类型注册表
//!
//! 设备类型与总线类型在这里注册：父类型、生命周期钩子、实现的接口，以及
//! 总线专有的属性（接受的设备类型、容量、插槽枚举器）。
//!
//! 注册时子类型继承父类型未被覆盖的钩子与接口，因此查询时无需再沿继承链回溯。
//! 每种总线类型的自动编号计数器也保存在这里：计数器按具体类型划分，
//! 被该类型的所有实例共享，永不重置。

use crate::error::{QdevError, QdevResult};
use crate::interface::{Interface, InterfaceTable};
use crate::slots::DeviceSlotInfo;
use crate::tree::{BusId, DeviceTree, NodeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 所有设备类型的抽象根类型
pub const TYPE_DEVICE: &str = "device";
/// 所有总线类型的抽象根类型
pub const TYPE_BUS: &str = "bus";
/// 默认系统总线类型
pub const TYPE_SYSTEM_BUS: &str = "System";
/// 可挂到系统总线上的设备的抽象类型
pub const TYPE_SYS_BUS_DEVICE: &str = "sys-bus-device";

/// realize/unrealize 钩子
pub type LifecycleHook = Arc<dyn Fn(&mut DeviceTree, NodeId) -> QdevResult<()> + Send + Sync>;
/// 复位钩子，不会失败
pub type ResetHook = Arc<dyn Fn(&mut DeviceTree, NodeId) + Send + Sync>;
/// 总线类型专有的插槽枚举器
pub type SlotEnumerator =
    Arc<dyn Fn(&DeviceTree, BusId) -> QdevResult<Vec<DeviceSlotInfo>> + Send + Sync>;

/// 类型种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// 设备
    Device,
    /// 总线
    Bus,
}

/// 类型描述
#[derive(Clone)]
pub struct TypeInfo {
    name: String,
    parent: Option<String>,
    kind: TypeKind,
    is_abstract: bool,
    hotpluggable: Option<bool>,
    realize: Option<LifecycleHook>,
    unrealize: Option<LifecycleHook>,
    reset: Option<ResetHook>,
    interfaces: InterfaceTable,
    device_type: Option<String>,
    max_dev: Option<usize>,
    enumerate_slots: Option<SlotEnumerator>,
}

impl TypeInfo {
    fn base(name: impl Into<String>, parent: Option<&str>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            kind,
            is_abstract: false,
            hotpluggable: None,
            realize: None,
            unrealize: None,
            reset: None,
            interfaces: InterfaceTable::new(),
            device_type: None,
            max_dev: None,
            enumerate_slots: None,
        }
    }

    /// 设备类型，默认父类型为 [`TYPE_DEVICE`]
    pub fn device(name: impl Into<String>) -> Self {
        Self::base(name, Some(TYPE_DEVICE), TypeKind::Device)
    }

    /// 总线类型，默认父类型为 [`TYPE_BUS`]
    pub fn bus(name: impl Into<String>) -> Self {
        Self::base(name, Some(TYPE_BUS), TypeKind::Bus)
    }

    /// 设置父类型
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// 标记为抽象类型（不可实例化）
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// 设备是否允许热插拔（默认允许）
    pub fn hotpluggable(mut self, hotpluggable: bool) -> Self {
        self.hotpluggable = Some(hotpluggable);
        self
    }

    /// realize 钩子
    pub fn realize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.realize = Some(Arc::new(hook));
        self
    }

    /// unrealize 钩子
    pub fn unrealize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.unrealize = Some(Arc::new(hook));
        self
    }

    /// 复位钩子
    pub fn reset<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId) + Send + Sync + 'static,
    {
        self.reset = Some(Arc::new(hook));
        self
    }

    /// 声明实现接口
    pub fn interface<I: Interface>(mut self, table: I) -> Self {
        self.interfaces.implement(table);
        self
    }

    /// 总线接受的设备类型
    pub fn device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// 总线容量
    pub fn max_dev(mut self, max_dev: usize) -> Self {
        self.max_dev = Some(max_dev);
        self
    }

    /// 总线专有的插槽枚举器
    pub fn enumerate_slots<F>(mut self, enumerator: F) -> Self
    where
        F: Fn(&DeviceTree, BusId) -> QdevResult<Vec<DeviceSlotInfo>> + Send + Sync + 'static,
    {
        self.enumerate_slots = Some(Arc::new(enumerator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_hotpluggable(&self) -> bool {
        self.hotpluggable.unwrap_or(true)
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn accepted_device_type(&self) -> Option<&str> {
        self.device_type.as_deref()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.max_dev
    }

    pub(crate) fn realize_hook(&self) -> Option<LifecycleHook> {
        self.realize.clone()
    }

    pub(crate) fn unrealize_hook(&self) -> Option<LifecycleHook> {
        self.unrealize.clone()
    }

    pub(crate) fn reset_hook(&self) -> Option<ResetHook> {
        self.reset.clone()
    }

    pub(crate) fn slot_enumerator(&self) -> Option<SlotEnumerator> {
        self.enumerate_slots.clone()
    }

    /// 继承父类型中本类型未覆盖的部分
    fn inherit(&mut self, parent: &TypeInfo) {
        self.hotpluggable = self.hotpluggable.or(parent.hotpluggable);
        self.realize = self.realize.take().or_else(|| parent.realize.clone());
        self.unrealize = self.unrealize.take().or_else(|| parent.unrealize.clone());
        self.reset = self.reset.take().or_else(|| parent.reset.clone());
        self.device_type = self.device_type.take().or_else(|| parent.device_type.clone());
        self.max_dev = self.max_dev.or(parent.max_dev);
        self.enumerate_slots = self
            .enumerate_slots
            .take()
            .or_else(|| parent.enumerate_slots.clone());
        self.interfaces.inherit_from(&parent.interfaces);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("kind", &self.kind)
            .field("abstract", &self.is_abstract)
            .field("interfaces", &self.interfaces)
            .field("device_type", &self.device_type)
            .field("max_dev", &self.max_dev)
            .finish_non_exhaustive()
    }
}

/// 类型注册表
#[derive(Debug)]
pub struct TypeRegistry {
    types: HashMap<String, TypeInfo>,
    automatic_ids: HashMap<String, u32>,
}

impl TypeRegistry {
    /// 创建注册表并注册内置类型
    pub fn new() -> Self {
        let mut types = HashMap::new();
        let builtins = [
            TypeInfo::base(TYPE_DEVICE, None, TypeKind::Device).abstract_type(),
            TypeInfo::base(TYPE_BUS, None, TypeKind::Bus).abstract_type(),
            TypeInfo::device(TYPE_SYS_BUS_DEVICE).abstract_type(),
            TypeInfo::bus(TYPE_SYSTEM_BUS).device_type(TYPE_SYS_BUS_DEVICE),
        ];
        for info in builtins {
            types.insert(info.name.clone(), info);
        }
        Self {
            types,
            automatic_ids: HashMap::new(),
        }
    }

    /// 注册类型
    ///
    /// 父类型必须已注册且种类相同；同名类型不能重复注册。
    pub fn register(&mut self, mut info: TypeInfo) -> QdevResult<()> {
        if self.types.contains_key(&info.name) {
            return Err(QdevError::InvalidType {
                name: info.name,
                message: "already registered".to_string(),
            });
        }
        if let Some(parent_name) = info.parent.clone() {
            let parent = self.get(&parent_name)?;
            if parent.kind != info.kind {
                return Err(QdevError::InvalidType {
                    name: info.name,
                    message: format!("parent type '{parent_name}' is of a different kind"),
                });
            }
            info.inherit(parent);
        }
        log::debug!(
            "Registered {:?} type '{}' (interfaces: {:?})",
            info.kind,
            info.name,
            info.interfaces.names()
        );
        self.types.insert(info.name.clone(), info);
        Ok(())
    }

    /// 查找类型
    pub fn get(&self, name: &str) -> QdevResult<&TypeInfo> {
        self.types
            .get(name)
            .ok_or_else(|| QdevError::UnknownType(name.to_string()))
    }

    /// `name` 是否为 `ancestor` 或其子类型
    pub fn is_a(&self, name: &str, ancestor: &str) -> bool {
        let mut current = self.types.get(name);
        while let Some(info) = current {
            if info.name == ancestor {
                return true;
            }
            current = info.parent.as_deref().and_then(|p| self.types.get(p));
        }
        false
    }

    /// 取出并递增总线类型的自动编号
    pub(crate) fn next_automatic_id(&mut self, bus_type: &str) -> u32 {
        let counter = self.automatic_ids.entry(bus_type.to_string()).or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
