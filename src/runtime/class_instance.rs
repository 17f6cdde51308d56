use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::runtime::{class::Class, value::Value};

/// Instance state: the class pointer and the two attribute tables.
///
/// External index access (`Value::Instance`) touches only `public`;
/// the `self` handle (`Value::InstanceSelf`) routes keys with a leading
/// underscore to `private`. Bound methods keep the instance alive through
/// the `self` handle they captured.
#[derive(Debug)]
pub struct ClassInstance {
    pub class: Arc<Class>,
    pub public: RwLock<HashMap<String, Value>>,
    pub private: RwLock<HashMap<String, Value>>,
}

impl ClassInstance {
    pub fn new(class: Arc<Class>) -> Self {
        Self {
            class,
            public: RwLock::new(HashMap::new()),
            private: RwLock::new(HashMap::new()),
        }
    }
}
