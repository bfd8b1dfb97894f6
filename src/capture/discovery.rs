//! Best-effort camera enumeration

use super::traits::{CameraBackend, CameraHandle};

/// Probe device indices `0..max_probe` in order, keeping the ones that open.
///
/// Not guaranteed to be exhaustive or stable across runs.
pub fn discover_cameras(backend: &dyn CameraBackend, max_probe: u32) -> Vec<CameraHandle> {
    let found: Vec<CameraHandle> = (0..max_probe)
        .map(CameraHandle::new)
        .filter(|camera| {
            let usable = backend.probe(*camera);
            tracing::debug!("Probe {} via {}: {}", camera, backend.name(), usable);
            usable
        })
        .collect();

    tracing::info!("Discovered {} camera(s): {:?}", found.len(), found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::MockCameraBackend;

    #[test]
    fn test_discover_keeps_only_openable_indices_in_order() {
        let backend = MockCameraBackend::new().with_cameras([4, 0, 2]);
        let found = discover_cameras(&backend, 10);
        assert_eq!(
            found,
            vec![CameraHandle::new(0), CameraHandle::new(2), CameraHandle::new(4)]
        );
    }

    #[test]
    fn test_discover_respects_index_limit() {
        let backend = MockCameraBackend::new().with_cameras([0, 5]);
        assert_eq!(discover_cameras(&backend, 3), vec![CameraHandle::new(0)]);
        assert!(discover_cameras(&backend, 0).is_empty());
    }

    #[test]
    fn test_discover_skips_failing_camera() {
        let backend = MockCameraBackend::new()
            .with_cameras([0, 1])
            .failing_open(1);
        assert_eq!(discover_cameras(&backend, 2), vec![CameraHandle::new(0)]);
    }
}
