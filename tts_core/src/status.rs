/// User-visible status line (notification, status board). Observational only.
pub trait StatusNotifier: Send + Sync {
    fn update_status(&self, title: &str, detail: &str);
}
