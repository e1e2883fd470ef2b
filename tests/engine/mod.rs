mod presence_tests;
mod room_tests;
