use crate::detection::Detection;

/// Maximum IoU two reconciled detections may share.
pub const RECONCILE_IOU_THRESHOLD: f64 = 0.5;

/// Merges detections from several scales into one set.
///
/// Largest area wins: candidates are visited by descending area (stable, so
/// equal areas keep encounter order) and dropped when they overlap an
/// already accepted detection by more than [`RECONCILE_IOU_THRESHOLD`].
/// Quadratic in the number of detections.
pub fn reconcile(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| b.area.total_cmp(&a.area));
    let mut accepted: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let keep = accepted
            .iter()
            .all(|a| candidate.bbox.iou(&a.bbox) <= RECONCILE_IOU_THRESHOLD);
        if keep {
            accepted.push(candidate);
        }
    }
    accepted
}
