//! 设备与总线的激活/停用状态机
//!
//! Unrealized → Realizing → Realized → Unrealizing → Unrealized
//!
//! 激活不递归：设备激活后其子总线上的设备仍保持原状态。停用则先深度优先停用
//! 所有子总线上的设备，任意一个失败即中止其余兄弟节点并把错误交给调用方，
//! 此时子树可能只被部分停用，调用方可以重试。

use crate::error::{LifecyclePhase, QdevError, QdevResult};
use crate::tree::{BusId, DeviceId, DeviceTree, LifecycleState, NodeId};

impl DeviceTree {
    /// 设置设备的 `realized` 状态
    pub fn set_device_realized(&mut self, dev: DeviceId, value: bool) -> QdevResult<()> {
        let state = self.device(dev)?.state();
        match (state, value) {
            (LifecycleState::Realized, true) | (LifecycleState::Unrealized, false) => Ok(()),
            (LifecycleState::Unrealized, true) => self.realize_device(dev),
            (LifecycleState::Realized, false) => self.unrealize_device(dev),
            (LifecycleState::Realizing | LifecycleState::Unrealizing, _) => {
                Err(QdevError::InvalidState {
                    node: self.node_label(dev.into()),
                    message: format!("lifecycle transition already in progress ({state:?})"),
                })
            }
        }
    }

    fn realize_device(&mut self, dev: DeviceId) -> QdevResult<()> {
        self.device_mut(dev)?.state = LifecycleState::Realizing;
        let hook = self.types().get(self.device(dev)?.type_name())?.realize_hook();

        let result = match hook {
            Some(hook) => hook(self, dev.into()),
            None => Ok(()),
        };

        // 钩子可能已经删除了设备本身
        let label = self.node_label(dev.into());
        let Ok(device) = self.device_mut(dev) else {
            return result.map_err(|e| QdevError::lifecycle(label, LifecyclePhase::Realize, e));
        };
        match result {
            Ok(()) => {
                device.state = LifecycleState::Realized;
                log::debug!("Realized '{label}'");
                Ok(())
            }
            Err(e) => {
                device.state = LifecycleState::Unrealized;
                log::warn!("Realize of '{label}' failed: {e}");
                Err(QdevError::lifecycle(label, LifecyclePhase::Realize, e))
            }
        }
    }

    fn unrealize_device(&mut self, dev: DeviceId) -> QdevResult<()> {
        self.device_mut(dev)?.state = LifecycleState::Unrealizing;

        if let Err(e) = self.unrealize_child_buses(dev) {
            if let Ok(device) = self.device_mut(dev) {
                device.state = LifecycleState::Realized;
            }
            return Err(e);
        }

        let hook = self.types().get(self.device(dev)?.type_name())?.unrealize_hook();
        let result = match hook {
            Some(hook) => hook(self, dev.into()),
            None => Ok(()),
        };

        let label = self.node_label(dev.into());
        let Ok(device) = self.device_mut(dev) else {
            return result.map_err(|e| QdevError::lifecycle(label, LifecyclePhase::Unrealize, e));
        };
        match result {
            Ok(()) => {
                device.state = LifecycleState::Unrealized;
                log::debug!("Unrealized '{label}'");
                Ok(())
            }
            Err(e) => {
                device.state = LifecycleState::Realized;
                log::warn!("Unrealize of '{label}' failed: {e}");
                Err(QdevError::lifecycle(label, LifecyclePhase::Unrealize, e))
            }
        }
    }

    /// 停用设备全部子总线上的设备（快照遍历，容忍节点中途消失）
    fn unrealize_child_buses(&mut self, dev: DeviceId) -> QdevResult<()> {
        for bus in self.child_buses(dev)? {
            if !self.contains(bus.into()) {
                continue;
            }
            self.unrealize_bus_children(bus)?;
        }
        Ok(())
    }

    fn unrealize_bus_children(&mut self, bus: BusId) -> QdevResult<()> {
        for kid in self.bus_children(bus)? {
            if self.contains(kid.into()) {
                self.set_device_realized(kid, false)?;
            }
        }
        Ok(())
    }

    /// 设置总线的 `realized` 状态
    ///
    /// 激活只运行总线自身的钩子；停用先停用总线上的全部设备，再运行钩子。
    pub fn set_bus_realized(&mut self, bus: BusId, value: bool) -> QdevResult<()> {
        let realized = self.bus(bus)?.is_realized();
        if realized == value {
            return Ok(());
        }

        let info = self.types().get(self.bus(bus)?.type_name())?;
        let (hook, phase) = if value {
            (info.realize_hook(), LifecyclePhase::Realize)
        } else {
            (info.unrealize_hook(), LifecyclePhase::Unrealize)
        };

        if !value {
            self.unrealize_bus_children(bus)?;
        }

        if let Some(hook) = hook {
            let node = NodeId::Bus(bus);
            if let Err(e) = hook(self, node) {
                let label = self.node_label(node);
                log::warn!("Failed to {phase} bus '{label}': {e}");
                return Err(QdevError::lifecycle(label, phase, e));
            }
        }

        if let Ok(b) = self.bus_mut(bus) {
            b.realized = value;
        }
        log::debug!("Bus '{}' realized = {}", self.node_label(bus.into()), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::QdevConfig;
    use crate::error::{LifecyclePhase, QdevError};
    use crate::tree::{DeviceTree, LifecycleState, NodeId};
    use crate::types::{TYPE_SYS_BUS_DEVICE, TypeInfo};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn tree(log: Arc<Mutex<Vec<String>>>) -> DeviceTree {
        let mut tree = DeviceTree::new(&QdevConfig::default()).unwrap();
        let realize_log = log.clone();
        let unrealize_log = log.clone();
        tree.register_type(
            TypeInfo::device("ctrl")
                .parent(TYPE_SYS_BUS_DEVICE)
                .realize(move |t, node| {
                    realize_log.lock().push(format!("realize {}", t.node_label(node)));
                    Ok(())
                })
                .unrealize(move |t, node| {
                    unrealize_log.lock().push(format!("unrealize {}", t.node_label(node)));
                    Ok(())
                }),
        )
        .unwrap();
        tree.register_type(TypeInfo::bus("child-bus")).unwrap();
        tree.register_type(TypeInfo::device("broken").realize(|_, _| Err(QdevError::hook("no backend"))))
            .unwrap();
        tree.register_type(
            TypeInfo::device("sticky").unrealize(|_, _| Err(QdevError::hook("busy"))),
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_realize_is_not_recursive() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree(log.clone());
        let top = tree.create_device("ctrl", Some("top")).unwrap();
        let bus = tree.create_bus("child-bus", Some(top), None).unwrap();
        let kid = tree.create_device("ctrl", Some("kid")).unwrap();
        tree.attach_device(kid, bus).unwrap();

        tree.set_device_realized(top, true).unwrap();
        assert!(tree.device(top).unwrap().is_realized());
        assert!(!tree.device(kid).unwrap().is_realized());
        assert_eq!(*log.lock(), vec!["realize top".to_string()]);

        // 已激活时再次激活为空操作
        tree.set_device_realized(top, true).unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_unrealize_children_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree(log.clone());
        let top = tree.create_device("ctrl", Some("top")).unwrap();
        let bus = tree.create_bus("child-bus", Some(top), None).unwrap();
        let kid = tree.create_device("ctrl", Some("kid")).unwrap();
        tree.attach_device(kid, bus).unwrap();
        tree.set_device_realized(kid, true).unwrap();
        tree.set_device_realized(top, true).unwrap();
        log.lock().clear();

        tree.set_device_realized(top, false).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["unrealize kid".to_string(), "unrealize top".to_string()]
        );
        assert_eq!(tree.device(kid).unwrap().state(), LifecycleState::Unrealized);
    }

    #[test]
    fn test_realize_failure_stays_unrealized() {
        let mut tree = tree(Arc::default());
        let dev = tree.create_device("broken", Some("bad")).unwrap();
        let err = tree.set_device_realized(dev, true).unwrap_err();
        assert!(matches!(
            err,
            QdevError::Lifecycle {
                phase: LifecyclePhase::Realize,
                ..
            }
        ));
        assert_eq!(err.root_cause(), &QdevError::hook("no backend"));
        assert_eq!(tree.device(dev).unwrap().state(), LifecycleState::Unrealized);
    }

    #[test]
    fn test_child_unrealize_failure_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree(log.clone());
        let top = tree.create_device("ctrl", Some("top")).unwrap();
        let bus = tree.create_bus("child-bus", Some(top), None).unwrap();
        let stuck = tree.create_device("sticky", Some("stuck")).unwrap();
        let later = tree.create_device("ctrl", Some("later")).unwrap();
        tree.attach_device(stuck, bus).unwrap();
        tree.attach_device(later, bus).unwrap();
        for dev in [stuck, later, top] {
            tree.set_device_realized(dev, true).unwrap();
        }
        log.lock().clear();

        let err = tree.set_device_realized(top, false).unwrap_err();
        assert_eq!(err.root_cause(), &QdevError::hook("busy"));
        assert!(tree.device(top).unwrap().is_realized());
        assert!(tree.device(stuck).unwrap().is_realized());
        // 后面的兄弟节点没有被停用
        assert!(tree.device(later).unwrap().is_realized());
        assert!(log.lock().is_empty());

        // 销毁同样被中止
        assert!(tree.destroy_device(top).is_err());
        assert!(tree.contains(NodeId::Device(top)));
    }

    #[test]
    fn test_bus_unrealize_unrealizes_children() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tree = tree(log.clone());
        let bus = tree.create_bus("child-bus", None, None).unwrap();
        let kid = tree.create_device("ctrl", Some("kid")).unwrap();
        tree.attach_device(kid, bus).unwrap();
        tree.set_bus_realized(bus, true).unwrap();
        tree.set_device_realized(kid, true).unwrap();

        tree.set_bus_realized(bus, false).unwrap();
        assert!(!tree.bus(bus).unwrap().is_realized());
        assert!(!tree.device(kid).unwrap().is_realized());
    }
}
