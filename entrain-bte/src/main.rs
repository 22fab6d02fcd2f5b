use entrain_bte::app::run;
fn main() {
    run::<f64>().unwrap();
}
