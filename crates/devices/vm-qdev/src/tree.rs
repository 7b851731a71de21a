//! 设备组合树
//!
//! 总线与设备交替组成的树：总线拥有挂在其上的设备，设备拥有其子总线。
//! 节点存放在以编号索引的arena中，父子之间只保存编号；编号单调递增、永不复用，
//! 因此指向已销毁节点的编号（例如热插拔处理器的弱链接）总能被识别为失效。
//!
//! 整棵树没有内部锁，所有修改与查询都要求调用方持有唯一的全局串行化点，
//! 参见 [`SharedDeviceTree`]。

use crate::config::QdevConfig;
use crate::error::{QdevError, QdevResult};
use crate::reset::{ResetRegistry, SimpleResetRegistry};
use crate::types::{TypeInfo, TypeKind, TypeRegistry};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// 设备编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(u64);

/// 总线编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusId(u64);

/// 树中任意节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    Bus(BusId),
    Device(DeviceId),
}

impl From<BusId> for NodeId {
    fn from(id: BusId) -> Self {
        NodeId::Bus(id)
    }
}

impl From<DeviceId> for NodeId {
    fn from(id: DeviceId) -> Self {
        NodeId::Device(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Bus(BusId(n)) => write!(f, "bus#{n}"),
            NodeId::Device(DeviceId(n)) => write!(f, "device#{n}"),
        }
    }
}

/// 设备生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Unrealized,
    Realizing,
    Realized,
    Unrealizing,
}

/// 设备节点
#[derive(Debug, Clone)]
pub struct Device {
    pub(crate) type_name: String,
    pub(crate) id: Option<String>,
    pub(crate) parent_bus: Option<BusId>,
    pub(crate) slot_index: Option<u32>,
    pub(crate) child_buses: Vec<BusId>,
    pub(crate) num_child_bus: u32,
    pub(crate) state: LifecycleState,
    pub(crate) unplug_pending: bool,
}

impl Device {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// 用户指定的设备 id
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn parent_bus(&self) -> Option<BusId> {
        self.parent_bus
    }

    /// 在父总线上的插槽序号（按插入顺序分配）
    pub fn slot_index(&self) -> Option<u32> {
        self.slot_index
    }

    /// 子总线，最新创建的在前
    pub fn child_buses(&self) -> &[BusId] {
        &self.child_buses
    }

    /// 子总线计数，用于子总线自动命名
    pub fn num_child_bus(&self) -> u32 {
        self.num_child_bus
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_realized(&self) -> bool {
        self.state == LifecycleState::Realized
    }

    /// 是否有尚未完成的拔出请求
    pub fn is_unplug_pending(&self) -> bool {
        self.unplug_pending
    }
}

/// 总线上的一个子设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusChild {
    pub device: DeviceId,
    pub index: u32,
}

/// 总线节点
#[derive(Debug, Clone)]
pub struct Bus {
    pub(crate) type_name: String,
    pub(crate) name: String,
    pub(crate) parent: Option<DeviceId>,
    pub(crate) children: Vec<BusChild>,
    pub(crate) max_index: u32,
    pub(crate) accepted_device_types: Vec<String>,
    pub(crate) capacity: Option<usize>,
    pub(crate) hotplug_handler: Option<NodeId>,
    pub(crate) realized: bool,
}

impl Bus {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn parent(&self) -> Option<DeviceId> {
        self.parent
    }

    /// 子设备，按插入顺序
    pub fn children(&self) -> &[BusChild] {
        &self.children
    }

    pub fn occupancy(&self) -> usize {
        self.children.len()
    }

    /// 容量，`None` 表示不限
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.children.len() >= capacity)
    }

    pub fn accepted_device_types(&self) -> &[String] {
        &self.accepted_device_types
    }

    /// 原始的热插拔处理器链接（可能已失效），
    /// 解析请用 [`DeviceTree::bus_hotplug_handler`]
    pub fn hotplug_handler_link(&self) -> Option<NodeId> {
        self.hotplug_handler
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }
}

/// 子树遍历顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// 父节点先于子节点
    PreOrder,
    /// 子节点先于父节点
    PostOrder,
}

/// 设备组合树
pub struct DeviceTree {
    types: TypeRegistry,
    devices: BTreeMap<DeviceId, Device>,
    buses: BTreeMap<BusId, Bus>,
    next_node: u64,
    root_buses: Vec<BusId>,
    system_bus: BusId,
    reset_registry: Arc<dyn ResetRegistry>,
    pub(crate) machine_hotplug_handler: Option<NodeId>,
    hotplug_only: bool,
}

impl DeviceTree {
    /// 按配置创建设备树，使用内置的复位注册表
    pub fn new(config: &QdevConfig) -> QdevResult<Self> {
        Self::with_reset_registry(config, Arc::new(SimpleResetRegistry::new()))
    }

    /// 按配置创建设备树，复位回调注册到外部提供的注册表
    ///
    /// 默认系统总线在这里创建，它不注册复位回调，也永远不会被销毁。
    pub fn with_reset_registry(
        config: &QdevConfig,
        reset_registry: Arc<dyn ResetRegistry>,
    ) -> QdevResult<Self> {
        config
            .validate()
            .map_err(|e| QdevError::Config(e.to_string()))?;

        let mut tree = Self {
            types: TypeRegistry::new(),
            devices: BTreeMap::new(),
            buses: BTreeMap::new(),
            next_node: 0,
            root_buses: Vec::new(),
            system_bus: BusId(0),
            reset_registry,
            machine_hotplug_handler: None,
            hotplug_only: config.hotplug_only,
        };
        tree.system_bus = tree.insert_bus(
            &config.system_bus_type,
            None,
            Some(&config.system_bus_name),
        )?;
        log::info!(
            "Device tree created with system bus '{}'",
            config.system_bus_name
        );
        Ok(tree)
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// 注册设备或总线类型
    pub fn register_type(&mut self, info: TypeInfo) -> QdevResult<()> {
        self.types.register(info)
    }

    /// 默认系统总线
    pub fn system_bus(&self) -> BusId {
        self.system_bus
    }

    pub(crate) fn reset_registry(&self) -> &Arc<dyn ResetRegistry> {
        &self.reset_registry
    }

    /// "仅热插拔"策略：机器初始化完成后置位，此后不可热插拔的总线不再可用
    pub fn hotplug_only(&self) -> bool {
        self.hotplug_only
    }

    pub fn set_hotplug_only(&mut self, hotplug_only: bool) {
        self.hotplug_only = hotplug_only;
    }

    pub fn bus(&self, id: BusId) -> QdevResult<&Bus> {
        self.buses
            .get(&id)
            .ok_or_else(|| QdevError::NotFound(NodeId::from(id).to_string()))
    }

    pub(crate) fn bus_mut(&mut self, id: BusId) -> QdevResult<&mut Bus> {
        self.buses
            .get_mut(&id)
            .ok_or_else(|| QdevError::NotFound(NodeId::from(id).to_string()))
    }

    pub fn device(&self, id: DeviceId) -> QdevResult<&Device> {
        self.devices
            .get(&id)
            .ok_or_else(|| QdevError::NotFound(NodeId::from(id).to_string()))
    }

    pub(crate) fn device_mut(&mut self, id: DeviceId) -> QdevResult<&mut Device> {
        self.devices
            .get_mut(&id)
            .ok_or_else(|| QdevError::NotFound(NodeId::from(id).to_string()))
    }

    pub fn contains(&self, node: NodeId) -> bool {
        match node {
            NodeId::Bus(id) => self.buses.contains_key(&id),
            NodeId::Device(id) => self.devices.contains_key(&id),
        }
    }

    pub fn type_name_of(&self, node: NodeId) -> QdevResult<&str> {
        match node {
            NodeId::Bus(id) => Ok(self.bus(id)?.type_name()),
            NodeId::Device(id) => Ok(self.device(id)?.type_name()),
        }
    }

    /// 节点的可读名称：总线名、设备 id，或 `类型#编号`
    pub fn node_label(&self, node: NodeId) -> String {
        match node {
            NodeId::Bus(id) => match self.buses.get(&id) {
                Some(bus) => bus.name.clone(),
                None => node.to_string(),
            },
            NodeId::Device(id) => match self.devices.get(&id) {
                Some(Device { id: Some(name), .. }) => name.clone(),
                Some(dev) => format!("{}#{}", dev.type_name, id.0),
                None => node.to_string(),
            },
        }
    }

    pub fn root_buses(&self) -> &[BusId] {
        &self.root_buses
    }

    /// 总线上的设备，按插入顺序
    pub fn bus_children(&self, bus: BusId) -> QdevResult<Vec<DeviceId>> {
        Ok(self.bus(bus)?.children.iter().map(|kid| kid.device).collect())
    }

    /// 设备的子总线，最新创建的在前
    pub fn child_buses(&self, dev: DeviceId) -> QdevResult<Vec<BusId>> {
        Ok(self.device(dev)?.child_buses.clone())
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn allocate_node(&mut self) -> u64 {
        let n = self.next_node;
        self.next_node += 1;
        n
    }

    fn sibling_buses(&self, parent: Option<DeviceId>) -> Vec<BusId> {
        match parent {
            Some(p) => self
                .devices
                .get(&p)
                .map(|d| d.child_buses.clone())
                .unwrap_or_default(),
            None => self.root_buses.clone(),
        }
    }

    /// 创建总线
    ///
    /// 命名规则（只在创建时执行一次）：
    /// 1. 显式给出的名称；
    /// 2. 父设备有 id 时为 `"{父设备id}.{n}"`，`n` 为父设备当前的子总线计数；
    /// 3. 否则为 `"{类型名}.{n}"` 整体转小写，`n` 为该总线类型的自动编号。
    ///
    /// 没有父设备的总线是根总线，会向复位注册表登记。
    pub fn create_bus(
        &mut self,
        type_name: &str,
        parent: Option<DeviceId>,
        name: Option<&str>,
    ) -> QdevResult<BusId> {
        let id = self.insert_bus(type_name, parent, name)?;
        if parent.is_none() {
            self.reset_registry.register(id);
        }
        Ok(id)
    }

    fn insert_bus(
        &mut self,
        type_name: &str,
        parent: Option<DeviceId>,
        name: Option<&str>,
    ) -> QdevResult<BusId> {
        let (accepted_device_types, capacity) = {
            let info = self.types.get(type_name)?;
            if info.kind() != TypeKind::Bus || info.is_abstract() {
                return Err(QdevError::InvalidType {
                    name: type_name.to_string(),
                    message: "not an instantiable bus type".to_string(),
                });
            }
            let accepted: Vec<String> = info
                .accepted_device_type()
                .map(|t| vec![t.to_string()])
                .unwrap_or_default();
            (accepted, info.capacity())
        };

        let parent_naming = match parent {
            Some(p) => {
                let dev = self.device(p)?;
                dev.id.clone().map(|id| (id, dev.num_child_bus))
            }
            None => None,
        };

        let bus_name = match (name, parent_naming) {
            (Some(name), _) => name.to_string(),
            (None, Some((parent_id, n))) => format!("{parent_id}.{n}"),
            (None, None) => {
                let n = self.types.next_automatic_id(type_name);
                format!("{type_name}.{n}").to_ascii_lowercase()
            }
        };

        let duplicate = self
            .sibling_buses(parent)
            .iter()
            .filter_map(|b| self.buses.get(b))
            .any(|b| b.name == bus_name);
        if duplicate {
            return Err(QdevError::DuplicateName(bus_name));
        }

        let id = BusId(self.allocate_node());
        self.buses.insert(
            id,
            Bus {
                type_name: type_name.to_string(),
                name: bus_name,
                parent,
                children: Vec::new(),
                max_index: 0,
                accepted_device_types,
                capacity,
                hotplug_handler: None,
                realized: false,
            },
        );
        match parent {
            Some(p) => {
                let dev = self.device_mut(p)?;
                dev.child_buses.insert(0, id);
                dev.num_child_bus += 1;
            }
            None => self.root_buses.push(id),
        }

        log::debug!(
            "Created {} bus '{}' under {}",
            type_name,
            self.node_label(id.into()),
            parent.map_or_else(|| "<root>".to_string(), |p| self.node_label(p.into()))
        );
        Ok(id)
    }

    /// 创建一个尚未挂到任何总线上的设备
    pub fn create_device(&mut self, type_name: &str, id: Option<&str>) -> QdevResult<DeviceId> {
        let info = self.types.get(type_name)?;
        if info.kind() != TypeKind::Device || info.is_abstract() {
            return Err(QdevError::InvalidType {
                name: type_name.to_string(),
                message: "not an instantiable device type".to_string(),
            });
        }
        if let Some(name) = id {
            if self.find_device_by_id(name).is_some() {
                return Err(QdevError::DuplicateName(name.to_string()));
            }
        }

        let dev = DeviceId(self.allocate_node());
        self.devices.insert(
            dev,
            Device {
                type_name: type_name.to_string(),
                id: id.map(str::to_string),
                parent_bus: None,
                slot_index: None,
                child_buses: Vec::new(),
                num_child_bus: 0,
                state: LifecycleState::Unrealized,
                unplug_pending: false,
            },
        );
        log::debug!("Created {} device '{}'", type_name, self.node_label(dev.into()));
        Ok(dev)
    }

    /// 检查总线是否还有空位
    pub fn check_bus_capacity(&self, bus: BusId) -> QdevResult<()> {
        let b = self.bus(bus)?;
        match b.capacity {
            Some(capacity) if b.children.len() >= capacity => Err(QdevError::Capacity {
                bus: b.name.clone(),
                capacity,
            }),
            _ => Ok(()),
        }
    }

    /// 检查设备能否挂到总线上（不修改树）
    pub fn check_attach(&self, dev: DeviceId, bus: BusId) -> QdevResult<()> {
        let device = self.device(dev)?;
        if device.parent_bus.is_some() {
            return Err(QdevError::InvalidState {
                node: self.node_label(dev.into()),
                message: "device is already attached to a bus".to_string(),
            });
        }
        self.check_bus_capacity(bus)?;

        let b = self.bus(bus)?;
        if !b.accepted_device_types.is_empty()
            && !b
                .accepted_device_types
                .iter()
                .any(|t| self.types.is_a(&device.type_name, t))
        {
            return Err(QdevError::IncompatibleDevice {
                bus: b.name.clone(),
                device_type: device.type_name.clone(),
            });
        }

        // 不能挂到自己的子树里
        let mut owner = b.parent;
        while let Some(d) = owner {
            if d == dev {
                return Err(QdevError::InvalidState {
                    node: self.node_label(dev.into()),
                    message: "bus belongs to the device's own subtree".to_string(),
                });
            }
            owner = self
                .devices
                .get(&d)
                .and_then(|p| p.parent_bus)
                .and_then(|pb| self.buses.get(&pb))
                .and_then(|pb| pb.parent);
        }
        Ok(())
    }

    /// 把设备挂到总线上
    ///
    /// 总线已满时返回 `Capacity` 错误，树保持不变。
    pub fn attach_device(&mut self, dev: DeviceId, bus: BusId) -> QdevResult<()> {
        self.check_attach(dev, bus)?;

        let b = self.bus_mut(bus)?;
        let index = b.max_index;
        b.max_index += 1;
        b.children.push(BusChild { device: dev, index });

        let device = self.device_mut(dev)?;
        device.parent_bus = Some(bus);
        device.slot_index = Some(index);

        log::debug!(
            "Attached '{}' to bus '{}' at index {}",
            self.node_label(dev.into()),
            self.node_label(bus.into()),
            index
        );
        Ok(())
    }

    /// 把设备从父总线上摘下（设备本身保留）
    pub fn detach_device(&mut self, dev: DeviceId) -> QdevResult<()> {
        let device = self.device_mut(dev)?;
        let Some(bus) = device.parent_bus.take() else {
            return Ok(());
        };
        device.slot_index = None;
        device.unplug_pending = false;

        if let Some(b) = self.buses.get_mut(&bus) {
            b.children.retain(|kid| kid.device != dev);
        }
        log::debug!(
            "Detached '{}' from bus '{}'",
            self.node_label(dev.into()),
            self.node_label(bus.into())
        );
        Ok(())
    }

    /// 销毁设备
    ///
    /// 先 unrealize（失败则中止销毁并返回错误），再销毁其全部子总线，
    /// 最后从父总线上摘下并释放。
    pub fn destroy_device(&mut self, dev: DeviceId) -> QdevResult<()> {
        if self.device(dev)?.state != LifecycleState::Unrealized {
            self.set_device_realized(dev, false)?;
        }

        let child_buses = self.device(dev)?.child_buses.clone();
        for bus in child_buses {
            if self.buses.contains_key(&bus) {
                self.destroy_bus(bus)?;
            }
        }

        if !self.devices.contains_key(&dev) {
            return Ok(());
        }
        let label = self.node_label(dev.into());
        self.detach_device(dev)?;
        self.devices.remove(&dev);
        log::debug!("Destroyed device '{label}'");
        Ok(())
    }

    /// 销毁总线
    ///
    /// 先销毁（并因此 unrealize）全部子设备，然后解除与父设备的关联并递减其
    /// 子总线计数；根总线则从复位注册表注销。默认系统总线不可销毁。
    pub fn destroy_bus(&mut self, bus: BusId) -> QdevResult<()> {
        if bus == self.system_bus {
            return Err(QdevError::SystemBusRemoval);
        }
        if self.bus(bus)?.realized {
            self.set_bus_realized(bus, false)?;
        }

        let kids: Vec<DeviceId> = self.bus(bus)?.children.iter().map(|k| k.device).collect();
        for kid in kids {
            if self.devices.contains_key(&kid) {
                self.destroy_device(kid)?;
            }
        }

        let Some(removed) = self.buses.remove(&bus) else {
            return Ok(());
        };
        match removed.parent {
            Some(p) => {
                if let Some(dev) = self.devices.get_mut(&p) {
                    dev.child_buses.retain(|b| *b != bus);
                    dev.num_child_bus = dev.num_child_bus.saturating_sub(1);
                }
            }
            None => {
                self.root_buses.retain(|b| *b != bus);
                self.reset_registry.unregister(bus);
            }
        }
        log::debug!("Destroyed bus '{}'", removed.name);
        Ok(())
    }

    fn collect_bus(&self, bus: BusId, order: WalkOrder, out: &mut Vec<NodeId>) {
        let Some(b) = self.buses.get(&bus) else {
            return;
        };
        if order == WalkOrder::PreOrder {
            out.push(bus.into());
        }
        for kid in &b.children {
            self.collect_device(kid.device, order, out);
        }
        if order == WalkOrder::PostOrder {
            out.push(bus.into());
        }
    }

    fn collect_device(&self, dev: DeviceId, order: WalkOrder, out: &mut Vec<NodeId>) {
        let Some(d) = self.devices.get(&dev) else {
            return;
        };
        if order == WalkOrder::PreOrder {
            out.push(dev.into());
        }
        for child in &d.child_buses {
            self.collect_bus(*child, order, out);
        }
        if order == WalkOrder::PostOrder {
            out.push(dev.into());
        }
    }

    /// 以快照形式列出总线子树中的全部节点
    ///
    /// 调用方在处理快照时可以修改树，处理前应检查节点是否仍然存在。
    pub fn walk_bus(&self, bus: BusId, order: WalkOrder) -> QdevResult<Vec<NodeId>> {
        self.bus(bus)?;
        let mut out = Vec::new();
        self.collect_bus(bus, order, &mut out);
        Ok(out)
    }

    /// 子树中的全部总线（先序）
    pub fn buses_in_subtree(&self, bus: BusId) -> QdevResult<Vec<BusId>> {
        Ok(self
            .walk_bus(bus, WalkOrder::PreOrder)?
            .into_iter()
            .filter_map(|n| match n {
                NodeId::Bus(b) => Some(b),
                NodeId::Device(_) => None,
            })
            .collect())
    }

    /// 所有根总线下的全部总线（先序，系统总线在前）
    pub fn all_buses(&self) -> Vec<BusId> {
        let mut out = Vec::new();
        for root in &self.root_buses {
            self.collect_bus(*root, WalkOrder::PreOrder, &mut out);
        }
        out.into_iter()
            .filter_map(|n| match n {
                NodeId::Bus(b) => Some(b),
                NodeId::Device(_) => None,
            })
            .collect()
    }

    /// 按名称查找总线（先序遍历中的第一个）
    pub fn find_bus_by_name(&self, name: &str) -> Option<BusId> {
        self.all_buses()
            .into_iter()
            .find(|b| self.buses.get(b).is_some_and(|bus| bus.name == name))
    }

    /// 按用户 id 查找设备
    pub fn find_device_by_id(&self, id: &str) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|(_, d)| d.id.as_deref() == Some(id))
            .map(|(dev, _)| *dev)
    }

    /// 设备在树中的路径，例如 `/main-system-bus/ide0/ide0.0/ide-hd[0]`
    pub fn device_path(&self, dev: DeviceId) -> QdevResult<String> {
        let mut parts = Vec::new();
        let mut current = dev;
        loop {
            let d = self.device(current)?;
            parts.push(match (&d.id, d.slot_index) {
                (Some(id), _) => id.clone(),
                (None, Some(index)) => format!("{}[{}]", d.type_name, index),
                (None, None) => d.type_name.clone(),
            });
            let Some(bus) = d.parent_bus else {
                break;
            };
            let b = self.bus(bus)?;
            parts.push(b.name.clone());
            match b.parent {
                Some(owner) => current = owner,
                None => break,
            }
        }
        parts.reverse();
        Ok(format!("/{}", parts.join("/")))
    }

    /// 整棵树中全部总线接受的设备类型（排序、去重）
    pub fn supported_device_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .buses
            .values()
            .flat_map(|b| b.accepted_device_types.iter().cloned())
            .collect();
        types.sort_unstable();
        types.dedup();
        types
    }
}

impl fmt::Debug for DeviceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTree")
            .field("buses", &self.buses)
            .field("devices", &self.devices)
            .field("root_buses", &self.root_buses)
            .field("system_bus", &self.system_bus)
            .field("hotplug_only", &self.hotplug_only)
            .finish_non_exhaustive()
    }
}

/// 带全局锁的设备树
///
/// 所有修改与查询都在同一把锁下串行执行；钩子拿到的是 `&mut DeviceTree`，
/// 重入时不需要再次加锁。
#[derive(Clone)]
pub struct SharedDeviceTree {
    inner: Arc<Mutex<DeviceTree>>,
}

impl SharedDeviceTree {
    pub fn new(tree: DeviceTree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    /// 获取全局锁
    pub fn lock(&self) -> MutexGuard<'_, DeviceTree> {
        self.inner.lock()
    }

    /// 在锁内执行一次操作
    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceTree) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}
