#[macro_use]
extern crate rocket;

#[launch]
fn rocket() -> _ {
    sobject_sync::rocket()
}
