//! 复位注册表与系统复位
//!
//! 除默认系统总线外，所有根总线在创建时向复位注册表登记，销毁时注销。
//! 系统复位依次复位系统总线与全部已登记的总线，每棵子树按后序执行
//! （子节点先于父节点）。

use crate::error::QdevResult;
use crate::tree::{BusId, DeviceTree, NodeId, WalkOrder};
use parking_lot::Mutex;

/// 进程级复位注册表
pub trait ResetRegistry: Send + Sync {
    /// 登记一条总线
    fn register(&self, bus: BusId);

    /// 注销一条总线；未登记时为空操作
    fn unregister(&self, bus: BusId);

    /// 按登记顺序列出已登记的总线
    fn registered(&self) -> Vec<BusId>;
}

/// 基于列表的复位注册表
#[derive(Debug, Default)]
pub struct SimpleResetRegistry {
    buses: Mutex<Vec<BusId>>,
}

impl SimpleResetRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResetRegistry for SimpleResetRegistry {
    fn register(&self, bus: BusId) {
        let mut buses = self.buses.lock();
        if !buses.contains(&bus) {
            buses.push(bus);
        }
    }

    fn unregister(&self, bus: BusId) {
        self.buses.lock().retain(|b| *b != bus);
    }

    fn registered(&self) -> Vec<BusId> {
        self.buses.lock().clone()
    }
}

impl DeviceTree {
    /// 复位一条总线的整棵子树（后序）
    pub fn reset_bus(&mut self, bus: BusId) -> QdevResult<()> {
        for node in self.walk_bus(bus, WalkOrder::PostOrder)? {
            self.reset_node(node);
        }
        Ok(())
    }

    fn reset_node(&mut self, node: NodeId) {
        let hook = match self.type_name_of(node) {
            Ok(type_name) => self.types().get(type_name).ok().and_then(|t| t.reset_hook()),
            // 复位过程中被移除的节点
            Err(_) => return,
        };
        if let Some(hook) = hook {
            hook(self, node);
        }
    }

    /// 系统复位：先复位默认系统总线，再复位所有已登记的根总线
    pub fn system_reset(&mut self) {
        let mut buses = vec![self.system_bus()];
        buses.extend(self.reset_registry().registered());

        log::info!("System reset of {} root bus(es)", buses.len());
        for bus in buses {
            if let Err(e) = self.reset_bus(bus) {
                log::debug!("Skipping reset of {bus:?}: {e}");
            }
        }
    }
}
