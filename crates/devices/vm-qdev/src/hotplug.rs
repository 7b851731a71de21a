//! 设备热插拔协议
//!
//! 四个相互独立的阶段，每个阶段都由编排者单向调用当前负责的热插拔处理器：
//!
//! - `pre_plug`：挂接前的校验与准备
//! - `plug`：完成挂接，可以分配资源
//! - `unplug_request`：请求拔出，实际移除可以推迟
//! - `unplug`：执行移除
//!
//! 处理器未实现某个阶段时，该阶段是静默的空操作。
//! 处理器的解析顺序：机器级处理器优先，否则取设备父总线上的处理器链接。
//! 总线只保存处理器的弱链接，每次使用时重新解析，已销毁的节点视为不存在。

use crate::error::{QdevError, QdevResult};
use crate::interface::Interface;
use crate::tree::{BusId, DeviceId, DeviceTree, NodeId};
use std::fmt;
use std::sync::Arc;

/// 热插拔阶段方法：`(树, 处理器节点, 目标设备)`
pub type HotplugFn = Arc<dyn Fn(&mut DeviceTree, NodeId, DeviceId) -> QdevResult<()> + Send + Sync>;

/// 热插拔阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugPhase {
    PrePlug,
    Plug,
    UnplugRequest,
    Unplug,
}

impl fmt::Display for HotplugPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotplugPhase::PrePlug => write!(f, "pre_plug"),
            HotplugPhase::Plug => write!(f, "plug"),
            HotplugPhase::UnplugRequest => write!(f, "unplug_request"),
            HotplugPhase::Unplug => write!(f, "unplug"),
        }
    }
}

/// 热插拔处理器接口：四个可选的阶段方法
#[derive(Clone, Default)]
pub struct HotplugHandlerClass {
    pub pre_plug: Option<HotplugFn>,
    pub plug: Option<HotplugFn>,
    pub unplug_request: Option<HotplugFn>,
    pub unplug: Option<HotplugFn>,
}

impl Interface for HotplugHandlerClass {
    const NAME: &'static str = "hotplug-handler";
}

impl HotplugHandlerClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pre_plug<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId, DeviceId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.pre_plug = Some(Arc::new(f));
        self
    }

    pub fn with_plug<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId, DeviceId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.plug = Some(Arc::new(f));
        self
    }

    pub fn with_unplug_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId, DeviceId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.unplug_request = Some(Arc::new(f));
        self
    }

    pub fn with_unplug<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DeviceTree, NodeId, DeviceId) -> QdevResult<()> + Send + Sync + 'static,
    {
        self.unplug = Some(Arc::new(f));
        self
    }

    /// 是否支持拔出（只检查方法是否存在，不调用）
    pub fn supports_unplug(&self) -> bool {
        self.unplug.is_some() || self.unplug_request.is_some()
    }

    fn method(&self, phase: HotplugPhase) -> Option<HotplugFn> {
        match phase {
            HotplugPhase::PrePlug => self.pre_plug.clone(),
            HotplugPhase::Plug => self.plug.clone(),
            HotplugPhase::UnplugRequest => self.unplug_request.clone(),
            HotplugPhase::Unplug => self.unplug.clone(),
        }
    }
}

impl fmt::Debug for HotplugHandlerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotplugHandlerClass")
            .field("pre_plug", &self.pre_plug.is_some())
            .field("plug", &self.plug.is_some())
            .field("unplug_request", &self.unplug_request.is_some())
            .field("unplug", &self.unplug.is_some())
            .finish()
    }
}

/// `device_del` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnplugOutcome {
    /// 已发出拔出请求，设备仍在树中，等待 [`DeviceTree::complete_unplug`]
    Requested,
    /// 设备已从树中移除
    Removed,
}

impl DeviceTree {
    fn hotplug_dispatch(
        &mut self,
        phase: HotplugPhase,
        handler: NodeId,
        dev: DeviceId,
    ) -> QdevResult<()> {
        let class = self.interface_of::<HotplugHandlerClass>(handler)?;
        let Some(method) = class.method(phase) else {
            return Ok(());
        };
        log::debug!(
            "Hotplug {} of '{}' via '{}'",
            phase,
            self.node_label(dev.into()),
            self.node_label(handler)
        );
        method(self, handler, dev)
    }

    pub fn hotplug_pre_plug(&mut self, handler: NodeId, dev: DeviceId) -> QdevResult<()> {
        self.hotplug_dispatch(HotplugPhase::PrePlug, handler, dev)
    }

    pub fn hotplug_plug(&mut self, handler: NodeId, dev: DeviceId) -> QdevResult<()> {
        self.hotplug_dispatch(HotplugPhase::Plug, handler, dev)
    }

    pub fn hotplug_unplug_request(&mut self, handler: NodeId, dev: DeviceId) -> QdevResult<()> {
        self.hotplug_dispatch(HotplugPhase::UnplugRequest, handler, dev)
    }

    pub fn hotplug_unplug(&mut self, handler: NodeId, dev: DeviceId) -> QdevResult<()> {
        self.hotplug_dispatch(HotplugPhase::Unplug, handler, dev)
    }

    fn check_handler(&self, node: NodeId) -> QdevResult<()> {
        if !self.contains(node) {
            return Err(QdevError::NotFound(node.to_string()));
        }
        self.interface_of::<HotplugHandlerClass>(node).map(|_| ())
    }

    /// 设置总线的热插拔处理器链接，处理器必须实现 `hotplug-handler` 接口
    ///
    /// 总线可以指定自己为处理器。
    pub fn set_bus_hotplug_handler(&mut self, bus: BusId, handler: Option<NodeId>) -> QdevResult<()> {
        if let Some(node) = handler {
            self.check_handler(node)?;
        }
        self.bus_mut(bus)?.hotplug_handler = handler;
        log::debug!(
            "Bus '{}' hotplug handler set to {}",
            self.node_label(bus.into()),
            handler.map_or_else(|| "<none>".to_string(), |h| self.node_label(h))
        );
        Ok(())
    }

    /// 设置机器级热插拔处理器，优先于总线上的处理器
    pub fn set_machine_hotplug_handler(&mut self, handler: Option<NodeId>) -> QdevResult<()> {
        if let Some(node) = handler {
            self.check_handler(node)?;
        }
        self.machine_hotplug_handler = handler;
        Ok(())
    }

    pub fn machine_hotplug_handler(&self) -> Option<NodeId> {
        self.machine_hotplug_handler.filter(|h| self.contains(*h))
    }

    /// 解析总线当前有效的处理器
    pub fn bus_hotplug_handler(&self, bus: BusId) -> QdevResult<Option<NodeId>> {
        Ok(self
            .bus(bus)?
            .hotplug_handler
            .filter(|h| self.contains(*h)))
    }

    fn handler_for_bus(&self, bus: BusId) -> QdevResult<Option<NodeId>> {
        match self.machine_hotplug_handler() {
            Some(handler) => Ok(Some(handler)),
            None => self.bus_hotplug_handler(bus),
        }
    }

    /// 解析负责设备的热插拔处理器
    pub fn hotplug_handler_for(&self, dev: DeviceId) -> QdevResult<Option<NodeId>> {
        if let Some(handler) = self.machine_hotplug_handler() {
            return Ok(Some(handler));
        }
        match self.device(dev)?.parent_bus() {
            Some(bus) => self.bus_hotplug_handler(bus),
            None => Ok(None),
        }
    }

    /// 总线是否可热插拔：其处理器实现了 `unplug` 或 `unplug_request`
    pub fn is_bus_hotpluggable(&self, bus: BusId) -> QdevResult<bool> {
        let Some(handler) = self.bus_hotplug_handler(bus)? else {
            return Ok(false);
        };
        Ok(self
            .interface_of::<HotplugHandlerClass>(handler)
            .is_ok_and(|class| class.supports_unplug()))
    }

    /// 创建设备并插入总线
    ///
    /// 顺序为：策略检查、容量预检、`pre_plug`、挂接、激活、`plug`。
    /// 挂接之后的任何失败都会把设备从树中撤回。
    pub fn device_add(&mut self, type_name: &str, id: Option<&str>, bus: BusId) -> QdevResult<DeviceId> {
        let type_hotpluggable = self.types().get(type_name)?.is_hotpluggable();
        if self.hotplug_only() {
            if !type_hotpluggable {
                return Err(QdevError::NotHotpluggable(type_name.to_string()));
            }
            if !self.is_bus_hotpluggable(bus)? {
                return Err(QdevError::NotHotpluggable(self.node_label(bus.into())));
            }
        }
        self.check_bus_capacity(bus)?;

        let dev = self.create_device(type_name, id)?;
        let handler = self.handler_for_bus(bus)?;

        if let Some(handler) = handler {
            if let Err(e) = self.hotplug_pre_plug(handler, dev) {
                self.rollback_device(dev);
                return Err(e);
            }
        }

        let result = self
            .attach_device(dev, bus)
            .and_then(|()| self.set_device_realized(dev, true))
            .and_then(|()| match handler {
                Some(handler) => self.hotplug_plug(handler, dev),
                None => Ok(()),
            });
        if let Err(e) = result {
            self.rollback_device(dev);
            return Err(e);
        }

        log::info!(
            "Device '{}' ({}) added to bus '{}'",
            self.node_label(dev.into()),
            type_name,
            self.node_label(bus.into())
        );
        Ok(dev)
    }

    fn rollback_device(&mut self, dev: DeviceId) {
        if !self.contains(dev.into()) {
            return;
        }
        let label = self.node_label(dev.into());
        match self.destroy_device(dev) {
            Ok(()) => log::warn!("Rolled back device '{label}'"),
            Err(e) => log::warn!("Failed to roll back device '{label}': {e}"),
        }
    }

    /// 请求拔出设备
    ///
    /// 处理器实现了 `unplug_request` 时只发出请求并标记设备为待拔出；
    /// 否则调用 `unplug` 并立即销毁设备。
    pub fn device_del(&mut self, dev: DeviceId) -> QdevResult<UnplugOutcome> {
        let device = self.device(dev)?;
        let label = self.node_label(dev.into());
        if device.is_unplug_pending() {
            return Err(QdevError::InvalidState {
                node: label,
                message: "unplug already requested".to_string(),
            });
        }
        if !self.types().get(device.type_name())?.is_hotpluggable() {
            return Err(QdevError::NotHotpluggable(label));
        }
        let Some(handler) = self.hotplug_handler_for(dev)? else {
            return Err(QdevError::NotHotpluggable(label));
        };

        let class = self.interface_of::<HotplugHandlerClass>(handler)?;
        if class.unplug_request.is_some() {
            self.hotplug_unplug_request(handler, dev)?;
            return match self.device_mut(dev) {
                Ok(device) => {
                    device.unplug_pending = true;
                    log::info!("Unplug of device '{label}' requested");
                    Ok(UnplugOutcome::Requested)
                }
                Err(_) => {
                    log::info!("Device '{label}' removed");
                    Ok(UnplugOutcome::Removed)
                }
            };
        }
        if class.unplug.is_some() {
            self.hotplug_unplug(handler, dev)?;
            if self.contains(dev.into()) {
                self.destroy_device(dev)?;
            }
            log::info!("Device '{label}' removed");
            return Ok(UnplugOutcome::Removed);
        }
        Err(QdevError::NotHotpluggable(label))
    }

    /// 完成一次拔出：调用 `unplug` 后销毁设备
    pub fn complete_unplug(&mut self, dev: DeviceId) -> QdevResult<()> {
        let label = self.node_label(dev.into());
        if let Some(handler) = self.hotplug_handler_for(dev)? {
            self.hotplug_unplug(handler, dev)?;
        }
        if self.contains(dev.into()) {
            self.destroy_device(dev)?;
        }
        log::info!("Device '{label}' removed");
        Ok(())
    }
}
