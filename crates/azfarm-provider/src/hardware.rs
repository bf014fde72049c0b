//! Azure VM size catalog.

use azfarm_core::HardwareType;

/// Capability figures for one VM size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmSpec {
    pub vcpus: u32,
    pub mem_mb: u32,
}

const fn spec(vcpus: u32, mem_gb: u32) -> VmSpec {
    VmSpec {
        vcpus,
        mem_mb: mem_gb * 1024,
    }
}

/// Known VM sizes, in the order they are offered when no allow-list is set.
pub const AZURE_VM_SIZES: &[(&str, VmSpec)] = &[
    // Compute optimised
    ("Standard_F2", spec(2, 4)),
    ("Standard_F4", spec(4, 8)),
    ("Standard_F8", spec(8, 16)),
    ("Standard_F16", spec(16, 32)),
    // General purpose
    ("Standard_D2_v3", spec(2, 8)),
    ("Standard_D4_v3", spec(4, 16)),
    ("Standard_D8_v3", spec(8, 32)),
    ("Standard_D16_v3", spec(16, 64)),
    ("Standard_D32_v3", spec(32, 128)),
    ("Standard_D64_v3", spec(64, 256)),
    // GPU
    ("Standard_NC6", spec(6, 56)),
    ("Standard_NC12", spec(12, 112)),
    ("Standard_NC24", spec(24, 224)),
];

pub fn vm_spec(vm_size: &str) -> Option<VmSpec> {
    AZURE_VM_SIZES
        .iter()
        .find(|(name, _)| *name == vm_size)
        .map(|(_, spec)| *spec)
}

fn hardware_type(vm_size: &str, spec: VmSpec) -> HardwareType {
    HardwareType {
        id: vm_size.to_string(),
        name: vm_size.to_string(),
        ram_mb: spec.mem_mb,
        vcpus: spec.vcpus,
    }
}

/// Hardware types for the allowed VM sizes, or the whole catalog when the
/// allow-list is empty.
///
/// Sizes missing from the catalog are still offered, with zeroed figures.
pub fn vm_sizes_to_hardware_types(allowed: &[String]) -> Vec<HardwareType> {
    if allowed.is_empty() {
        return AZURE_VM_SIZES
            .iter()
            .map(|(name, spec)| hardware_type(name, *spec))
            .collect();
    }

    allowed
        .iter()
        .map(|size| {
            let spec = vm_spec(size).unwrap_or(VmSpec { vcpus: 0, mem_mb: 0 });
            hardware_type(size, spec)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_keeps_order_and_zeroes_unknowns() {
        let allowed = vec![
            "Standard_NC6".to_string(),
            "Standard_Z99".to_string(),
            "Standard_F2".to_string(),
        ];
        let types = vm_sizes_to_hardware_types(&allowed);

        assert_eq!(types.len(), 3);
        assert_eq!(types[0].id, "Standard_NC6");
        assert_eq!(types[0].vcpus, 6);
        assert_eq!(types[0].ram_mb, 56 * 1024);
        assert_eq!(types[1].id, "Standard_Z99");
        assert_eq!(types[1].name, "Standard_Z99");
        assert_eq!((types[1].vcpus, types[1].ram_mb), (0, 0));
        assert_eq!(types[2].ram_mb, 4096);
    }

    #[test]
    fn empty_allow_list_returns_catalog() {
        let types = vm_sizes_to_hardware_types(&[]);
        assert_eq!(types.len(), 13);
        assert_eq!(types[0].id, "Standard_F2");
        assert_eq!(types[12].id, "Standard_NC24");
        assert!(types.iter().all(|t| t.vcpus > 0 && t.ram_mb > 0));
    }

    #[test]
    fn d64_figures() {
        assert_eq!(
            vm_spec("Standard_D64_v3"),
            Some(VmSpec {
                vcpus: 64,
                mem_mb: 262144
            })
        );
        assert_eq!(vm_spec("standard_d64_v3"), None);
    }
}
