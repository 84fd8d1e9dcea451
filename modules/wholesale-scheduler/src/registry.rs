use std::collections::HashMap;
use std::sync::Arc;

use wholesale_adapters::SupplierAdapter;

/// Resolves a supplier tag to its configured adapter. The CLI builds one
/// of these at startup from `SupplierAccount` rows; kept as a trait so
/// tests can substitute a fixed map.
pub trait AdapterRegistry: Send + Sync {
    fn adapter_for(&self, supplier_tag: &str) -> Option<Arc<dyn SupplierAdapter>>;
}

#[derive(Default)]
pub struct StaticAdapterRegistry {
    adapters: HashMap<String, Arc<dyn SupplierAdapter>>,
}

impl StaticAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn SupplierAdapter>) {
        self.adapters.insert(adapter.supplier_tag().to_string(), adapter);
    }
}

impl AdapterRegistry for StaticAdapterRegistry {
    fn adapter_for(&self, supplier_tag: &str) -> Option<Arc<dyn SupplierAdapter>> {
        self.adapters.get(supplier_tag).cloned()
    }
}
